//! Request principal extraction.
//!
//! User authentication is explicitly out of scope for the core (spec.md
//! §1: "treated as an external collaborator"). Rather than replicate
//! `sem_os_server::middleware::jwt`'s JWT validation, this layer trusts an
//! upstream gateway to have already authenticated the caller and forwarded
//! their identity in `X-User-Id` — the minimal seam the core needs to scope
//! rate limiting and idempotency per spec.md §4.3/§4.4.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

pub struct MissingPrincipal;

impl IntoResponse for MissingPrincipal {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing X-User-Id header"})),
        )
            .into_response()
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = MissingPrincipal;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(MissingPrincipal)?;
        Ok(Principal { user_id: user_id.to_string() })
    }
}
