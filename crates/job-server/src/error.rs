//! HTTP error mapping (spec.md §6/§7).
//!
//! Wraps every domain error enum from `job-core`/`job-webhooks` in one
//! `AppError`, grounded on `sem_os_server::error::AppError`'s
//! `IntoResponse` pattern: each variant maps to a status code and a
//! `{"error": <english code>, "message": <turkish text>, "code": <status>}`
//! body, with per-error extra fields (`existing_job_id`, `retry_after`,
//! ...) merged in where spec.md §6 requires them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use job_core::{JobError, LifecycleError, NotificationError, WebhookError};
use serde_json::json;

use crate::locale;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn lifecycle_code(err: &LifecycleError) -> (&'static str, StatusCode) {
    match err {
        LifecycleError::NotFound(_) => ("NOT_FOUND", StatusCode::NOT_FOUND),
        LifecycleError::Terminal { .. } => ("TERMINAL", StatusCode::CONFLICT),
        LifecycleError::InvalidTransition { .. } => {
            ("INVALID_TRANSITION", StatusCode::CONFLICT)
        }
        LifecycleError::Storage(_) => ("ERR-JOB-500", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn job_status(code: &str) -> StatusCode {
    match code {
        "ERR-JOB-400" => StatusCode::BAD_REQUEST,
        "ERR-JOB-422" => StatusCode::UNPROCESSABLE_ENTITY,
        "ERR-JOB-409" => StatusCode::CONFLICT,
        "ERR-JOB-413" => StatusCode::PAYLOAD_TOO_LARGE,
        "ERR-JOB-429" => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Job(err) => {
                let code = err.code();
                let status = job_status(code);
                let mut body = json!({
                    "error": code,
                    "message": locale::job_error_text(code),
                    "code": status.as_u16(),
                });
                if let JobError::IdempotencyConflict { existing_job_id } = &err {
                    body["existing_job_id"] = json!(existing_job_id);
                }
                if let JobError::RateLimited { retry_after_secs, limit, remaining, reset_at } = &err {
                    body["retry_after"] = json!(retry_after_secs);
                    body["limit"] = json!(limit);
                    body["remaining"] = json!(remaining);
                    body["reset_at"] = json!(reset_at);
                }
                if let JobError::PayloadTooLarge { size, limit } = &err {
                    body["payload_size"] = json!(size);
                    body["limit"] = json!(limit);
                }
                tracing::warn!(error = %err, code, "job request rejected");
                (status, Json(body)).into_response()
            }
            AppError::Lifecycle(err) => {
                let (code, status) = lifecycle_code(&err);
                tracing::warn!(error = %err, code, "lifecycle update rejected");
                (
                    status,
                    Json(json!({
                        "error": code,
                        "message": locale::lifecycle_error_text(code),
                        "code": status.as_u16(),
                    })),
                )
                    .into_response()
            }
            AppError::Notification(err) => {
                tracing::error!(error = %err, "notification pipeline error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "ERR-JOB-500",
                        "message": locale::job_error_text("ERR-JOB-500"),
                        "code": 500,
                    })),
                )
                    .into_response()
            }
            AppError::Webhook(err) => {
                let code = err.code();
                let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                tracing::warn!(error = %err, code, "webhook rejected");
                let mut body = json!({
                    "error": code,
                    "message": locale::webhook_error_text(code),
                    "code": status.as_u16(),
                });
                if let WebhookError::PaymentNotFound { provider, provider_payment_id } = &err {
                    body["provider"] = json!(provider);
                    body["provider_payment_id"] = json!(provider_payment_id);
                }
                (status, Json(body)).into_response()
            }
            AppError::Other(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "ERR-JOB-500",
                        "message": locale::job_error_text("ERR-JOB-500"),
                        "code": 500,
                    })),
                )
                    .into_response()
            }
        }
    }
}
