//! Notification Dispatcher (spec.md §4.10).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::model::{Channel, DeliveryStatus, NotificationAttempt, NotificationDelivery, ProviderResult};

pub const BACKOFF_BASE_SECONDS: f64 = 2.0;
pub const JITTER_FRACTION: f64 = 0.10;

/// `send(channel, recipient, subject?, body, attempts_metadata)` (spec.md
/// §6 "Notification-provider contract").
#[async_trait::async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        attempt_number: u32,
    ) -> ProviderResult;
}

#[async_trait::async_trait]
pub trait AttemptStore: Send + Sync {
    async fn next_attempt_number(&self, delivery_id: Uuid) -> anyhow::Result<u32>;
    async fn record(&self, attempt: &NotificationAttempt) -> anyhow::Result<()>;
    async fn update_delivery(&self, delivery: &NotificationDelivery) -> anyhow::Result<()>;
}

/// Decision the dispatcher reaches after one send attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchDecision {
    Delivered,
    RetryScheduled { delay_seconds: f64 },
    Failed,
    Bounced,
}

pub struct NotificationDispatcher {
    primary: Arc<dyn NotificationProvider>,
    fallback: Arc<dyn NotificationProvider>,
    attempts: Arc<dyn AttemptStore>,
}

impl NotificationDispatcher {
    pub fn new(
        primary: Arc<dyn NotificationProvider>,
        fallback: Arc<dyn NotificationProvider>,
        attempts: Arc<dyn AttemptStore>,
    ) -> Self {
        Self {
            primary,
            fallback,
            attempts,
        }
    }

    /// Sends one attempt for `delivery`, using the fallback provider only
    /// when `use_fallback` is set (the caller switches to fallback after an
    /// infrastructural outage on the primary, per spec.md §4.10).
    pub async fn dispatch_once(
        &self,
        delivery: &mut NotificationDelivery,
        use_fallback: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DispatchDecision> {
        let provider: &Arc<dyn NotificationProvider> = if use_fallback { &self.fallback } else { &self.primary };
        let attempt_number = self.attempts.next_attempt_number(delivery.id).await?;

        let result = provider
            .send(
                delivery.channel,
                &delivery.recipient,
                delivery.subject.as_deref(),
                &delivery.body,
                attempt_number,
            )
            .await;

        let attempt = NotificationAttempt {
            id: Uuid::now_v7(),
            delivery_id: delivery.id,
            attempt_number,
            provider: provider.name().to_string(),
            result: Some(result.clone()),
            started_at: now,
            completed_at: Some(now),
        };
        self.attempts.record(&attempt).await?;

        let decision = match result {
            ProviderResult::Success { message_id } => {
                delivery.status = DeliveryStatus::Sent;
                delivery.actual_provider = Some(provider.name().to_string());
                delivery.provider_message_id = Some(message_id);
                DispatchDecision::Delivered
            }
            ProviderResult::TransientFail { .. } => {
                if delivery.retry_count < delivery.max_retries {
                    let delay = backoff_delay(delivery.retry_count);
                    delivery.retry_count += 1;
                    DispatchDecision::RetryScheduled { delay_seconds: delay }
                } else {
                    delivery.status = DeliveryStatus::Failed;
                    DispatchDecision::Failed
                }
            }
            ProviderResult::PermanentFail { code, .. } => {
                delivery.status = if code == "bounced" || code == "invalid_number" {
                    DeliveryStatus::Bounced
                } else {
                    DeliveryStatus::Failed
                };
                match delivery.status {
                    DeliveryStatus::Bounced => DispatchDecision::Bounced,
                    _ => DispatchDecision::Failed,
                }
            }
        };

        delivery.updated_at = now;
        self.attempts.update_delivery(delivery).await?;
        Ok(decision)
    }
}

/// `base · 2^retry_count` with ±10% uniform jitter (spec.md §4.10).
pub fn backoff_delay(retry_count: u32) -> f64 {
    let base = BACKOFF_BASE_SECONDS * 2f64.powi(retry_count as i32);
    let jitter_span = base * JITTER_FRACTION;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    (base + jitter).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        for retry in 0..5 {
            let delay = backoff_delay(retry);
            let base = BACKOFF_BASE_SECONDS * 2f64.powi(retry as i32);
            let span = base * JITTER_FRACTION;
            assert!(delay >= base - span - 1e-9);
            assert!(delay <= base + span + 1e-9);
        }
    }
}
