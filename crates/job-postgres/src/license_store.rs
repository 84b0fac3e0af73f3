//! `LicenseReader` against the read-only `licenses` mirror table.

use chrono::{DateTime, Utc};
use job_core::model::{License, LicenseStatus};
use job_core::ports::LicenseReader;
use sqlx::{PgPool, Row};

pub struct PgLicenseReader {
    pool: PgPool,
}

impl PgLicenseReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_str(raw: &str) -> LicenseStatus {
    match raw {
        "active" => LicenseStatus::Active,
        "suspended" => LicenseStatus::Suspended,
        "expired" => LicenseStatus::Expired,
        _ => LicenseStatus::Revoked,
    }
}

#[async_trait::async_trait]
impl LicenseReader for PgLicenseReader {
    async fn expiring_within(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> anyhow::Result<Vec<License>> {
        let rows = sqlx::query(
            "SELECT id, user_id, status, ends_at FROM licenses WHERE status = 'active' AND ends_at >= $1 AND ends_at < $2",
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(License {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    status: status_from_str(row.try_get::<String, _>("status")?.as_str()),
                    ends_at: row.try_get("ends_at")?,
                })
            })
            .collect()
    }
}
