//! `TemplateResolver`, `DeliveryStore` and `AttemptStore` against Postgres.
//!
//! Note: `UserContactResolver` (spec.md §4.9 step 2) is deliberately not
//! implemented here — the user directory is an external collaborator (out
//! of scope per spec.md §1's "user authentication... treated as external
//! collaborators"); `job-server` wires a directory-service adapter instead.

use job_notify::model::{Channel, DeliveryStatus, NotificationAttempt, NotificationDelivery, ProviderResult};
use job_notify::{AttemptStore, DeliveryStore, Template, TemplateResolver};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgTemplateResolver {
    pool: PgPool,
}

impl PgTemplateResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TemplateResolver for PgTemplateResolver {
    async fn find(&self, kind: &str, channel: &str, language: &str) -> anyhow::Result<Option<Template>> {
        let row = sqlx::query(
            "SELECT id, subject, body FROM notification_templates WHERE kind = $1 AND channel = $2 AND language = $3",
        )
        .bind(kind)
        .bind(channel)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(Template {
                id: row.try_get("id")?,
                subject: row.try_get("subject")?,
                body: row.try_get("body")?,
            })
        })
        .transpose()
    }
}

fn channel_to_str(channel: Channel) -> &'static str {
    match channel {
        Channel::Email => "EMAIL",
        Channel::Sms => "SMS",
    }
}

fn delivery_status_to_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Queued => "QUEUED",
        DeliveryStatus::Sent => "SENT",
        DeliveryStatus::Delivered => "DELIVERED",
        DeliveryStatus::Failed => "FAILED",
        DeliveryStatus::Bounced => "BOUNCED",
    }
}

fn delivery_status_from_str(raw: &str) -> DeliveryStatus {
    match raw {
        "SENT" => DeliveryStatus::Sent,
        "DELIVERED" => DeliveryStatus::Delivered,
        "FAILED" => DeliveryStatus::Failed,
        "BOUNCED" => DeliveryStatus::Bounced,
        _ => DeliveryStatus::Queued,
    }
}

pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeliveryStore for PgDeliveryStore {
    /// Relies on `notifications_delivery_dedup_uniq` (spec.md §6); a
    /// conflicting row means this (license, days_out, channel) was already
    /// queued, so the insert is a no-op and the caller counts it as a
    /// skipped duplicate.
    async fn try_insert(&self, delivery: &NotificationDelivery) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications_delivery (
                id, user_id, license_id, template_id, channel, recipient, days_out,
                subject, body, variables, status, primary_provider, actual_provider,
                provider_message_id, retry_count, max_retries, scheduled_at,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            ON CONFLICT (license_id, days_out, channel) DO NOTHING
            "#,
        )
        .bind(delivery.id)
        .bind(&delivery.user_id)
        .bind(delivery.license_id)
        .bind(&delivery.template_id)
        .bind(channel_to_str(delivery.channel))
        .bind(&delivery.recipient)
        .bind(delivery.days_out)
        .bind(&delivery.subject)
        .bind(&delivery.body)
        .bind(&delivery.variables)
        .bind(delivery_status_to_str(delivery.status))
        .bind(&delivery.primary_provider)
        .bind(&delivery.actual_provider)
        .bind(&delivery.provider_message_id)
        .bind(delivery.retry_count as i32)
        .bind(delivery.max_retries as i32)
        .bind(delivery.scheduled_at)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttemptStore for PgAttemptStore {
    async fn next_attempt_number(&self, delivery_id: Uuid) -> anyhow::Result<u32> {
        let row = sqlx::query("SELECT COALESCE(MAX(attempt_number), 0) AS n FROM notification_attempts WHERE delivery_id = $1")
            .bind(delivery_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i32, _>("n")? as u32 + 1)
    }

    async fn record(&self, attempt: &NotificationAttempt) -> anyhow::Result<()> {
        let result_json = attempt
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            "INSERT INTO notification_attempts (id, delivery_id, attempt_number, provider, result, started_at, completed_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(attempt.id)
        .bind(attempt.delivery_id)
        .bind(attempt.attempt_number as i32)
        .bind(&attempt.provider)
        .bind(result_json)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_delivery(&self, delivery: &NotificationDelivery) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications_delivery SET
                status = $2, actual_provider = $3, provider_message_id = $4,
                retry_count = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(delivery_status_to_str(delivery.status))
        .bind(&delivery.actual_provider)
        .bind(&delivery.provider_message_id)
        .bind(delivery.retry_count as i32)
        .bind(delivery.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
