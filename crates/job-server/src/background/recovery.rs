//! Recovery sweeps: webhook retry-due processing and stuck-PENDING job
//! re-publish (spec.md §4.5 "crash recovery", §6 "retry scheduling").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use job_core::ports::JobStore;
use job_queue::envelope::TaskEnvelope;
use job_queue::publisher::{PublishOutcome, QueuePublisher};
use job_webhooks::WebhookProcessor;

/// A job left PENDING this long without a broker task id is assumed to have
/// been lost (server crashed between insert and publish) and is republished.
const STUCK_PENDING_AFTER_SECONDS: i64 = 60;

pub struct RecoveryLoop {
    jobs: Arc<dyn JobStore>,
    publisher: Arc<QueuePublisher>,
    webhook_processor: Arc<WebhookProcessor>,
    interval: Duration,
}

impl RecoveryLoop {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        publisher: Arc<QueuePublisher>,
        webhook_processor: Arc<WebhookProcessor>,
        interval: Duration,
    ) -> Self {
        Self { jobs, publisher, webhook_processor, interval }
    }

    /// Never returns under normal operation — spawn via `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "recovery sweep started");
        loop {
            let now = Utc::now();

            if let Err(err) = self.sweep_stuck_jobs(now).await {
                tracing::error!(error = %err, "stuck job sweep failed");
            }

            match self.webhook_processor.retry_due(now).await {
                Ok(results) => {
                    for (event_id, outcome) in results {
                        match outcome {
                            Ok(outcome) => {
                                tracing::info!(event_id = %event_id, ?outcome, "webhook retry processed");
                            }
                            Err(err) => {
                                tracing::error!(event_id = %event_id, error = %err, "webhook retry failed");
                            }
                        }
                    }
                }
                Err(err) => tracing::error!(error = %err, "webhook retry sweep failed"),
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn sweep_stuck_jobs(&self, now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
        let older_than = now - chrono::Duration::seconds(STUCK_PENDING_AFTER_SECONDS);
        let stuck = self.jobs.list_stuck_pending(older_than).await?;

        for mut job in stuck {
            let envelope = TaskEnvelope {
                job_id: job.id,
                kind: job.kind,
                params: job.params.clone(),
                submitted_by: job.submitted_by.clone(),
                attempt: job.attempts,
                created_at: job.created_at,
            };

            match self.publisher.publish(job.kind, &envelope).await {
                PublishOutcome::Published { broker_task_id } => {
                    job.mark_queued(broker_task_id, now)?;
                    self.jobs.update(&job).await?;
                    tracing::info!(job_id = %job.id, "stuck job republished");
                }
                PublishOutcome::PersistentFailure { last_error } => {
                    tracing::error!(job_id = %job.id, last_error, "stuck job republish exhausted retries");
                }
            }
        }
        Ok(())
    }
}
