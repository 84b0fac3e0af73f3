//! POST /webhooks/:provider — payment-provider webhook ingress.
//!
//! Unauthenticated by principal; trust is established by the per-provider
//! HMAC signature instead (spec.md §6 "Webhook ingress").

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use job_webhooks::{ProcessOutcome, WebhookProcessor};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAckResponse {
    pub outcome: &'static str,
}

fn outcome_label(outcome: ProcessOutcome) -> &'static str {
    match outcome {
        ProcessOutcome::Delivered => "DELIVERED",
        ProcessOutcome::IdempotentNoOp => "IDEMPOTENT_NOOP",
        ProcessOutcome::LockHeldElsewhere => "LOCK_HELD_ELSEWHERE",
        ProcessOutcome::RetryScheduled => "RETRY_SCHEDULED",
        ProcessOutcome::DeadLettered => "DEAD_LETTERED",
    }
}

pub async fn receive_webhook(
    Path(provider): Path<String>,
    Extension(processor): Extension<Arc<WebhookProcessor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAckResponse>), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let raw: Value = serde_json::from_slice(&body).map_err(|e| anyhow::anyhow!(e))?;
    let parsed = parse_provider_payload(&raw)?;

    let outcome = processor.process(&provider, signature, &body, parsed).await?;
    Ok((
        StatusCode::OK,
        Json(WebhookAckResponse {
            outcome: outcome_label(outcome),
        }),
    ))
}

/// Extracts the fields the processor needs from a provider's raw JSON body.
/// Every provider this core talks to (Stripe/Iyzico-style) reports the same
/// shape once unwrapped: an event id, an event type, the payment id, and a
/// status string.
fn parse_provider_payload(raw: &Value) -> anyhow::Result<job_webhooks::ParsedWebhookPayload> {
    let event_id = raw.get("id").or_else(|| raw.get("event_id")).and_then(Value::as_str).unwrap_or_default().to_string();
    let event_type = raw.get("type").or_else(|| raw.get("event_type")).and_then(Value::as_str).unwrap_or_default().to_string();
    let data = raw.get("data").and_then(|d| d.get("object")).unwrap_or(raw);
    let provider_payment_id = data
        .get("id")
        .or_else(|| data.get("payment_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let new_status = data.get("status").and_then(Value::as_str).unwrap_or_default().to_string();
    let metadata = data.get("metadata").cloned().unwrap_or_else(|| serde_json::json!({}));

    Ok(job_webhooks::ParsedWebhookPayload {
        event_id,
        event_type,
        provider_payment_id,
        new_status,
        metadata,
    })
}
