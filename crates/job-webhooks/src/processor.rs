//! Webhook Dedup & Processor pipeline (spec.md §4.11).
//!
//! Grounded on `ob-workflow::listener`'s retry/backoff shape
//! (`requeue_with_retry`/`move_to_dlq`), adapted to the webhook event's own
//! cap (`max_retries = 5`, backoff capped at 16 minutes) instead of the
//! listener's fixed `MAX_RETRIES = 3`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use job_core::WebhookError;
use serde_json::Value;

use crate::model::{ParsedWebhookPayload, PaymentStatus, WebhookEvent, WebhookStatus};
use crate::signature::SignatureVerifier;

pub const DEFAULT_LOCK_TIMEOUT_SECONDS: i64 = 300;
pub const MAX_RETRIES: u32 = 5;
pub const MAX_BACKOFF_SECONDS: i64 = 16 * 60;

/// Persistence seam for the `webhook_events` table.
#[async_trait::async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Inserts keyed by `(provider, event_id)`; on unique-violation, the
    /// implementation re-reads and returns the existing row with
    /// `inserted = false` (spec.md §4.11 step 3).
    async fn insert_or_fetch(&self, event: &WebhookEvent) -> anyhow::Result<(WebhookEvent, bool)>;

    /// Attempts to take the processing lock; `false` if another worker
    /// holds an unexpired one (spec.md §4.11 step 4).
    async fn try_lock(&self, id: uuid::Uuid, locked_by: &str, now: DateTime<Utc>, lock_timeout_seconds: i64) -> anyhow::Result<bool>;

    /// Events still `pending` whose `next_attempt_at` has passed — the
    /// retry sweep's work list (spec.md §4.11: "a retry scheduled via
    /// exponential backoff").
    async fn list_due_for_retry(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<WebhookEvent>>;

    async fn mark_delivered(&self, id: uuid::Uuid, now: DateTime<Utc>) -> anyhow::Result<()>;

    async fn schedule_retry(
        &self,
        id: uuid::Uuid,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn mark_failed(&self, id: uuid::Uuid, last_error: &str, now: DateTime<Utc>) -> anyhow::Result<()>;
}

/// The steps (5)-(7) of spec.md §4.11, bundled into one atomic unit so the
/// persistence layer can wrap them in a single Postgres transaction
/// (Open Question (c): "either commit-or-rollback, never neither").
#[async_trait::async_trait]
pub trait PaymentTransactionPort: Send + Sync {
    async fn apply(
        &self,
        provider: &str,
        provider_payment_id: &str,
        new_status: PaymentStatus,
        metadata: &Value,
    ) -> Result<(), WebhookError>;
}

pub struct WebhookProcessor {
    verifiers: std::collections::HashMap<String, Arc<dyn SignatureVerifier>>,
    events: Arc<dyn WebhookEventStore>,
    transactions: Arc<dyn PaymentTransactionPort>,
    worker_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Delivered,
    IdempotentNoOp,
    LockHeldElsewhere,
    RetryScheduled,
    DeadLettered,
}

impl WebhookProcessor {
    pub fn new(
        verifiers: std::collections::HashMap<String, Arc<dyn SignatureVerifier>>,
        events: Arc<dyn WebhookEventStore>,
        transactions: Arc<dyn PaymentTransactionPort>,
        worker_id: String,
    ) -> Self {
        Self {
            verifiers,
            events,
            transactions,
            worker_id,
        }
    }

    pub async fn process(
        &self,
        provider: &str,
        signature_header: &str,
        raw_body: &[u8],
        parsed: ParsedWebhookPayload,
    ) -> Result<ProcessOutcome, WebhookError> {
        let verifier = self
            .verifiers
            .get(provider)
            .ok_or(WebhookError::InvalidSignature)?;
        if !verifier.verify(signature_header, raw_body) {
            return Err(WebhookError::InvalidSignature);
        }
        if parsed.event_id.is_empty() {
            return Err(WebhookError::MissingEventId);
        }
        if parsed.provider_payment_id.is_empty() {
            return Err(WebhookError::MissingPaymentId);
        }

        let now = Utc::now();
        let payload = serde_json::to_value(&parsed).map_err(|e| WebhookError::Critical(e.into()))?;
        let candidate = WebhookEvent::new(
            provider.to_string(),
            parsed.event_id.clone(),
            parsed.event_type.clone(),
            payload,
            now,
        );
        let (event, inserted) = self
            .events
            .insert_or_fetch(&candidate)
            .await
            .map_err(WebhookError::Critical)?;

        if !inserted && event.status == WebhookStatus::Delivered {
            return Ok(ProcessOutcome::IdempotentNoOp);
        }

        let got_lock = self
            .events
            .try_lock(event.id, &self.worker_id, now, DEFAULT_LOCK_TIMEOUT_SECONDS)
            .await
            .map_err(WebhookError::Critical)?;
        if !got_lock {
            return Ok(ProcessOutcome::LockHeldElsewhere);
        }

        self.attempt(&event, &parsed, now).await
    }

    /// Re-drives steps (5)-(7) for one event already past its
    /// `next_attempt_at`, on the core's own retry sweep rather than waiting
    /// for the provider to redeliver (spec.md §4.11's capped-backoff
    /// retry). Callers should invoke this from a periodically-scheduled
    /// background task; each event is processed independently, so one
    /// failure does not interrupt the sweep.
    pub async fn retry_due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<(uuid::Uuid, Result<ProcessOutcome, WebhookError>)>> {
        let due = self.events.list_due_for_retry(now).await?;
        let mut results = Vec::with_capacity(due.len());
        for event in due {
            let got_lock = self
                .events
                .try_lock(event.id, &self.worker_id, now, DEFAULT_LOCK_TIMEOUT_SECONDS)
                .await;
            let got_lock = match got_lock {
                Ok(got_lock) => got_lock,
                Err(err) => {
                    results.push((event.id, Err(WebhookError::Critical(err))));
                    continue;
                }
            };
            if !got_lock {
                results.push((event.id, Ok(ProcessOutcome::LockHeldElsewhere)));
                continue;
            }

            let parsed: Result<ParsedWebhookPayload, _> = serde_json::from_value(event.payload.clone());
            let outcome = match parsed {
                Ok(parsed) => self.attempt(&event, &parsed, now).await,
                Err(err) => Err(WebhookError::Critical(err.into())),
            };
            let event_id = event.id;
            results.push((event_id, outcome));
        }
        Ok(results)
    }

    /// Shared steps (5)-(7): locate the payment, apply the transition,
    /// decide delivered/retry/dead-letter. The caller must already hold the
    /// processing lock.
    async fn attempt(
        &self,
        event: &WebhookEvent,
        parsed: &ParsedWebhookPayload,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, WebhookError> {
        let new_status = PaymentStatus::from_provider_status(&parsed.new_status)
            .ok_or_else(|| WebhookError::IdempotencyError(format!("unrecognized status '{}'", parsed.new_status)))?;

        let apply_result = self
            .transactions
            .apply(&event.provider, &parsed.provider_payment_id, new_status, &parsed.metadata)
            .await;

        match apply_result {
            Ok(()) => {
                self.events
                    .mark_delivered(event.id, now)
                    .await
                    .map_err(WebhookError::Critical)?;
                Ok(ProcessOutcome::Delivered)
            }
            Err(WebhookError::PaymentNotFound { provider, provider_payment_id }) => {
                let err = WebhookError::PaymentNotFound { provider, provider_payment_id };
                self.events
                    .mark_failed(event.id, &err.to_string(), now)
                    .await
                    .map_err(WebhookError::Critical)?;
                Err(err)
            }
            Err(other) => {
                if event.retry_count + 1 >= MAX_RETRIES {
                    self.events
                        .mark_failed(event.id, &other.to_string(), now)
                        .await
                        .map_err(WebhookError::Critical)?;
                    Ok(ProcessOutcome::DeadLettered)
                } else {
                    let delay = retry_delay_seconds(event.retry_count);
                    self.events
                        .schedule_retry(event.id, event.retry_count + 1, now + chrono::Duration::seconds(delay), &other.to_string(), now)
                        .await
                        .map_err(WebhookError::Critical)?;
                    Ok(ProcessOutcome::RetryScheduled)
                }
            }
        }
    }
}

/// Exponential backoff capped at 16 minutes (spec.md §4.11).
pub fn retry_delay_seconds(retry_count: u32) -> i64 {
    let raw = 2i64.saturating_pow(retry_count + 1) * 15;
    raw.min(MAX_BACKOFF_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_sixteen_minutes() {
        for retry in 0..10 {
            assert!(retry_delay_seconds(retry) <= MAX_BACKOFF_SECONDS);
        }
    }

    #[test]
    fn backoff_grows_with_retry_count() {
        assert!(retry_delay_seconds(1) >= retry_delay_seconds(0));
        assert!(retry_delay_seconds(2) >= retry_delay_seconds(1));
    }
}
