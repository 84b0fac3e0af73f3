//! Webhook, Payment, Invoice and audit-log types (spec.md §3).
//!
//! `PaymentStatus` variants match
//! `examples/original_source/apps/api/app/models/enums.py`'s
//! `PaymentStatus` enum (PENDING/SUCCEEDED/FAILED/REFUNDED). The
//! `WebhookEvent` shape here is spec.md §3's inbound payment-provider
//! event, a distinct concept from the original's outbound
//! `webhook_event.py` delivery-log model — spec.md is authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub status: WebhookStatus,
    pub retry_count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_response: Option<String>,
    pub last_error: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    /// The parsed event body (spec.md §4.11 step 2), stored so a retry
    /// sweep can re-run step (6) without the provider redelivering.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(
        provider: String,
        event_id: String,
        event_type: String,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider,
            event_id,
            event_type,
            status: WebhookStatus::Pending,
            retry_count: 0,
            next_attempt_at: None,
            last_response: None,
            last_error: None,
            locked_at: None,
            locked_by: None,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// A lock is stale once it is older than `timeout_seconds` (default
    /// 300s, spec.md §4.11 step 4).
    pub fn lock_expired(&self, now: DateTime<Utc>, timeout_seconds: i64) -> bool {
        match self.locked_at {
            Some(locked_at) => now - locked_at >= chrono::Duration::seconds(timeout_seconds),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoicePaidStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Maps a provider-reported status string onto the internal enum
    /// (spec.md §4.11 step 6).
    pub fn from_provider_status(raw: &str) -> Option<Self> {
        match raw {
            "succeeded" | "payment_intent.succeeded" | "success" => Some(PaymentStatus::Succeeded),
            "failed" | "payment_intent.payment_failed" => Some(PaymentStatus::Failed),
            "refunded" | "charge.refunded" => Some(PaymentStatus::Refunded),
            "pending" => Some(PaymentStatus::Pending),
            _ => None,
        }
    }

    pub fn invoice_paid_status(&self) -> InvoicePaidStatus {
        match self {
            PaymentStatus::Succeeded => InvoicePaidStatus::Paid,
            PaymentStatus::Failed => InvoicePaidStatus::Failed,
            PaymentStatus::Refunded => InvoicePaidStatus::Refunded,
            PaymentStatus::Pending => InvoicePaidStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub provider: String,
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub updated_at: DateTime<Utc>,
}

/// Append-only (spec.md §3 "PaymentAuditLog"); ordering preserved by
/// creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuditLog {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub action: String,
    pub actor_type: String,
    pub actor_id: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Parsed event body (spec.md §4.11 step 2). Persisted verbatim on the
/// `WebhookEvent` row so a later retry sweep can re-drive step (6) without
/// needing the provider to redeliver the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedWebhookPayload {
    pub event_id: String,
    pub event_type: String,
    pub provider_payment_id: String,
    pub new_status: String,
    pub metadata: serde_json::Value,
}
