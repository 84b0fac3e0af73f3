//! Notification dispatch consumer loop (spec.md §4.10).
//!
//! `PgDeliveryStore` only exposes `try_insert` — there is no "list queued
//! deliveries" query to poll. `DispatchingDeliveryStore` closes that gap: it
//! decorates the real store and, on every newly inserted delivery, forwards
//! a copy over an unbounded channel to the consumer loop below, which drives
//! each delivery through `NotificationDispatcher` until it is terminal.

use std::sync::Arc;

use chrono::Utc;
use job_notify::dispatcher::{DispatchDecision, NotificationDispatcher};
use job_notify::model::NotificationDelivery;
use job_notify::DeliveryStore;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub struct DispatchingDeliveryStore {
    inner: Arc<dyn DeliveryStore>,
    sender: UnboundedSender<NotificationDelivery>,
}

impl DispatchingDeliveryStore {
    pub fn new(inner: Arc<dyn DeliveryStore>, sender: UnboundedSender<NotificationDelivery>) -> Self {
        Self { inner, sender }
    }
}

#[async_trait::async_trait]
impl DeliveryStore for DispatchingDeliveryStore {
    async fn try_insert(&self, delivery: &NotificationDelivery) -> anyhow::Result<bool> {
        let inserted = self.inner.try_insert(delivery).await?;
        if inserted {
            if self.sender.send(delivery.clone()).is_err() {
                tracing::warn!(delivery_id = %delivery.id, "dispatch queue closed, delivery will not be sent until recovered");
            }
        }
        Ok(inserted)
    }
}

pub struct DispatcherLoop {
    dispatcher: Arc<NotificationDispatcher>,
    receiver: UnboundedReceiver<NotificationDelivery>,
}

impl DispatcherLoop {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, receiver: UnboundedReceiver<NotificationDelivery>) -> Self {
        Self { dispatcher, receiver }
    }

    /// Consumes freshly queued deliveries and drives each to completion,
    /// re-enqueuing transient failures after their backoff delay. Never
    /// returns under normal operation — spawn via `tokio::spawn`.
    pub async fn run(mut self) {
        tracing::info!("notification dispatcher started");
        while let Some(mut delivery) = self.receiver.recv().await {
            self.drive(&mut delivery, false).await;
        }
        tracing::warn!("notification dispatcher channel closed, loop exiting");
    }

    async fn drive(&self, delivery: &mut NotificationDelivery, use_fallback: bool) {
        let now = Utc::now();
        match self.dispatcher.dispatch_once(delivery, use_fallback, now).await {
            Ok(DispatchDecision::Delivered) => {
                tracing::info!(delivery_id = %delivery.id, "notification delivered");
            }
            Ok(DispatchDecision::RetryScheduled { delay_seconds }) => {
                tracing::warn!(delivery_id = %delivery.id, delay_seconds, "notification send failed transiently, retrying");
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay_seconds.max(0.0))).await;
                Box::pin(self.drive(delivery, true)).await;
            }
            Ok(DispatchDecision::Failed) => {
                tracing::error!(delivery_id = %delivery.id, "notification delivery failed permanently");
            }
            Ok(DispatchDecision::Bounced) => {
                tracing::error!(delivery_id = %delivery.id, "notification bounced");
            }
            Err(err) => {
                tracing::error!(delivery_id = %delivery.id, error = %err, "notification dispatch storage error");
            }
        }
    }
}
