//! `WebhookEventStore` and `PaymentTransactionPort` against Postgres.
//!
//! The transactional apply step is grounded on `ob-workflow::listener`'s
//! `handle_task_result` — several statements against one `PgPool`
//! connection inside a `sqlx::Transaction`, committed only if every step
//! succeeds (Open Question (c): never partially applied).

use chrono::{DateTime, Utc};
use job_core::WebhookError;
use job_webhooks::model::{PaymentStatus, WebhookEvent, WebhookStatus};
use job_webhooks::{PaymentTransactionPort, WebhookEventStore};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgWebhookEventStore {
    pool: PgPool,
}

impl PgWebhookEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_to_str(status: WebhookStatus) -> &'static str {
    match status {
        WebhookStatus::Pending => "pending",
        WebhookStatus::Processing => "processing",
        WebhookStatus::Delivered => "delivered",
        WebhookStatus::Failed => "failed",
    }
}

fn status_from_str(raw: &str) -> WebhookStatus {
    match raw {
        "processing" => WebhookStatus::Processing,
        "delivered" => WebhookStatus::Delivered,
        "failed" => WebhookStatus::Failed,
        _ => WebhookStatus::Pending,
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> anyhow::Result<WebhookEvent> {
    Ok(WebhookEvent {
        id: row.try_get("id")?,
        provider: row.try_get("provider")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        status: status_from_str(row.try_get::<String, _>("status")?.as_str()),
        retry_count: row.try_get::<i32, _>("retry_count")? as u32,
        next_attempt_at: row.try_get("next_attempt_at")?,
        last_response: row.try_get("last_response")?,
        last_error: row.try_get("last_error")?,
        locked_at: row.try_get("locked_at")?,
        locked_by: row.try_get("locked_by")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait::async_trait]
impl WebhookEventStore for PgWebhookEventStore {
    async fn insert_or_fetch(&self, event: &WebhookEvent) -> anyhow::Result<(WebhookEvent, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (id, provider, event_id, event_type, status, retry_count, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.provider)
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(status_to_str(event.status))
        .bind(event.retry_count as i32)
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok((event.clone(), true));
        }

        let row = sqlx::query("SELECT * FROM webhook_events WHERE provider = $1 AND event_id = $2")
            .bind(&event.provider)
            .bind(&event.event_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((row_to_event(&row)?, false))
    }

    async fn try_lock(&self, id: Uuid, locked_by: &str, now: DateTime<Utc>, lock_timeout_seconds: i64) -> anyhow::Result<bool> {
        let stale_before = now - chrono::Duration::seconds(lock_timeout_seconds);
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET locked_at = $2, locked_by = $3, status = 'processing', updated_at = $2
            WHERE id = $1 AND (locked_at IS NULL OR locked_at < $4)
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(locked_by)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_due_for_retry(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<WebhookEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM webhook_events WHERE status = 'pending' AND next_attempt_at IS NOT NULL AND next_attempt_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn mark_delivered(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE webhook_events SET status = 'delivered', locked_at = NULL, locked_by = NULL, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = 'pending', retry_count = $2, next_attempt_at = $3,
                last_error = $4, locked_at = NULL, locked_by = NULL, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retry_count as i32)
        .bind(next_attempt_at)
        .bind(last_error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, last_error: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE webhook_events SET status = 'failed', last_error = $2, locked_at = NULL, locked_by = NULL, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(last_error)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgPaymentTransaction {
    pool: PgPool,
}

impl PgPaymentTransaction {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn payment_status_to_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Succeeded => "SUCCEEDED",
        PaymentStatus::Failed => "FAILED",
        PaymentStatus::Refunded => "REFUNDED",
    }
}

fn invoice_paid_status_to_str(status: job_webhooks::model::InvoicePaidStatus) -> &'static str {
    use job_webhooks::model::InvoicePaidStatus;
    match status {
        InvoicePaidStatus::Pending => "PENDING",
        InvoicePaidStatus::Paid => "PAID",
        InvoicePaidStatus::Failed => "FAILED",
        InvoicePaidStatus::Refunded => "REFUNDED",
    }
}

#[async_trait::async_trait]
impl PaymentTransactionPort for PgPaymentTransaction {
    /// Steps (5)-(7) of spec.md §4.11, in one transaction: locate the
    /// payment, apply the status transition, update the owning invoice,
    /// append the audit entry. Any failure rolls the whole thing back.
    async fn apply(&self, provider: &str, provider_payment_id: &str, new_status: PaymentStatus, metadata: &Value) -> Result<(), WebhookError> {
        let mut tx = self.pool.begin().await.map_err(|e| WebhookError::Critical(e.into()))?;

        let payment_row = sqlx::query("SELECT id, invoice_id FROM payments WHERE provider = $1 AND provider_payment_id = $2 FOR UPDATE")
            .bind(provider)
            .bind(provider_payment_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| WebhookError::Critical(e.into()))?;

        let Some(payment_row) = payment_row else {
            tx.rollback().await.map_err(|e| WebhookError::Critical(e.into()))?;
            return Err(WebhookError::PaymentNotFound {
                provider: provider.to_string(),
                provider_payment_id: provider_payment_id.to_string(),
            });
        };

        let payment_id: Uuid = payment_row.try_get("id").map_err(|e| WebhookError::Critical(e.into()))?;
        let invoice_id: Uuid = payment_row.try_get("invoice_id").map_err(|e| WebhookError::Critical(e.into()))?;
        let now = Utc::now();

        sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(payment_id)
            .bind(payment_status_to_str(new_status))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| WebhookError::Critical(e.into()))?;

        sqlx::query("UPDATE invoices SET paid_status = $2, updated_at = $3 WHERE id = $1")
            .bind(invoice_id)
            .bind(invoice_paid_status_to_str(new_status.invoice_paid_status()))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| WebhookError::Critical(e.into()))?;

        sqlx::query(
            "INSERT INTO payment_audit_logs (id, payment_id, invoice_id, action, actor_type, actor_id, context, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::now_v7())
        .bind(payment_id)
        .bind(invoice_id)
        .bind("webhook_status_transition")
        .bind("webhook")
        .bind(provider)
        .bind(metadata)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| WebhookError::Critical(e.into()))?;

        tx.commit().await.map_err(|e| WebhookError::Critical(e.into()))?;
        Ok(())
    }
}
