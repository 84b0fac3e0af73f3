//! The slice of the licensing subsystem's License entity the core reads
//! (spec.md §3: "the core consumes only {id, user-id, status, ends_at}").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Suspended,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: Uuid,
    pub user_id: String,
    pub status: LicenseStatus,
    pub ends_at: DateTime<Utc>,
}
