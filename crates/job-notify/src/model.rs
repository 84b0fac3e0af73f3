//! `NotificationDelivery` and `NotificationAttempt` (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
    Bounced,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed | DeliveryStatus::Bounced)
    }
}

/// `D ∈ {7, 3, 1}` — the only valid reminder offsets (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaysOut {
    Seven = 7,
    Three = 3,
    One = 1,
}

impl DaysOut {
    pub const ALL: [DaysOut; 3] = [DaysOut::Seven, DaysOut::Three, DaysOut::One];

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub id: Uuid,
    pub user_id: String,
    pub license_id: Option<Uuid>,
    pub template_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub days_out: Option<i32>,
    pub subject: Option<String>,
    pub body: String,
    pub variables: serde_json::Value,
    pub status: DeliveryStatus,
    pub primary_provider: String,
    pub actual_provider: Option<String>,
    pub provider_message_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Error classification a provider adapter returns (spec.md §6 "Notification
/// provider contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderResult {
    Success { message_id: String },
    TransientFail { code: String, message: String },
    PermanentFail { code: String, message: String },
}

/// One send try (spec.md §3 "NotificationAttempt"). Immutable once
/// `completed_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub attempt_number: u32,
    pub provider: String,
    pub result: Option<ProviderResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
