//! Queue Publisher (spec.md §4.6).
//!
//! Retry policy and compression threshold are ported directly from
//! `job_validator.py::publish_job_task`: `retry_policy = {max_retries: 3,
//! interval_start: 0, interval_step: 0.2, interval_max: 0.2}` and
//! `COMPRESSION_THRESHOLD_BYTES = 1024`.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use job_core::JobKind;

use crate::broker::{Broker, BrokerError, PublishRequest, TOPIC_EXCHANGE};
use crate::envelope::TaskEnvelope;

pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024;
/// Delays before each of the three *retries* that follow the initial publish
/// attempt (spec.md §4.6: "up to 3 retries with 0 / 0.2 / 0.2 s delays").
const RETRY_DELAYS_SECS: [f64; 3] = [0.0, 0.2, 0.2];

/// Outcome of a publish attempt. `PersistentFailure` means the job must be
/// left PENDING for a recovery sweep (spec.md §4.6) — publishing never rolls
/// back the already-committed Job row.
pub enum PublishOutcome {
    Published { broker_task_id: String },
    PersistentFailure { last_error: String },
}

pub struct QueuePublisher {
    broker: Arc<dyn Broker>,
}

impl QueuePublisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Publishes `envelope` to the queue/routing-key the router table
    /// assigns to `kind`, retrying operational broker errors per the fixed
    /// policy above. Never called before the Job row is committed (spec.md
    /// §4.6: "Publisher MUST be called after the Job row is committed").
    pub async fn publish(&self, kind: JobKind, envelope: &TaskEnvelope) -> PublishOutcome {
        let route = kind.route();
        let body = match envelope.to_json_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                return PublishOutcome::PersistentFailure {
                    last_error: format!("envelope serialization failed: {err}"),
                }
            }
        };

        let (body, compressed) = if body.len() > COMPRESSION_THRESHOLD_BYTES {
            (gzip(&body), true)
        } else {
            (body, false)
        };

        let request = |body: Vec<u8>| PublishRequest {
            exchange: TOPIC_EXCHANGE,
            queue: route.queue,
            routing_key: route.routing_key,
            body,
            compressed,
        };

        // Initial attempt, then three retries at RETRY_DELAYS_SECS — four
        // total tries, matching kombu's `max_retries: 3` (spec.md §4.6).
        let mut last_err = match self.broker.publish(request(body.clone())).await {
            Ok(broker_task_id) => return PublishOutcome::Published { broker_task_id },
            Err(err) => {
                tracing::warn!(job_id = %envelope.job_id, error = %err, "broker publish attempt failed");
                Some(err)
            }
        };

        for delay in RETRY_DELAYS_SECS {
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
            match self.broker.publish(request(body.clone())).await {
                Ok(broker_task_id) => return PublishOutcome::Published { broker_task_id },
                Err(err) => {
                    tracing::warn!(job_id = %envelope.job_id, error = %err, "broker publish attempt failed");
                    last_err = Some(err);
                }
            }
        }

        PublishOutcome::PersistentFailure {
            last_error: last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown broker error".into()),
        }
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory encoder cannot fail");
    encoder.finish().expect("finishing an in-memory encoder cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct FlakyBroker {
        fail_times: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Broker for FlakyBroker {
        async fn publish(&self, _request: PublishRequest<'_>) -> Result<String, BrokerError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(BrokerError::Operational("connection reset".into()));
            }
            Ok("task-123".into())
        }
    }

    struct AlwaysFailsBroker;

    #[async_trait::async_trait]
    impl Broker for AlwaysFailsBroker {
        async fn publish(&self, _request: PublishRequest<'_>) -> Result<String, BrokerError> {
            Err(BrokerError::Operational("down".into()))
        }
    }

    fn envelope() -> TaskEnvelope {
        TaskEnvelope {
            job_id: Uuid::now_v7(),
            kind: JobKind::Model,
            params: json!({"box": {"w": 1, "h": 1, "d": 1}}),
            submitted_by: "user-1".into(),
            attempt: 1,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn recovers_within_retry_budget() {
        let publisher = QueuePublisher::new(Arc::new(FlakyBroker { fail_times: AtomicU32::new(3) }));
        let outcome = publisher.publish(JobKind::Model, &envelope()).await;
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_persistent_failure() {
        let publisher = QueuePublisher::new(Arc::new(AlwaysFailsBroker));
        let outcome = publisher.publish(JobKind::Model, &envelope()).await;
        assert!(matches!(outcome, PublishOutcome::PersistentFailure { .. }));
    }

    #[test]
    fn large_envelope_is_compressed() {
        let big_params = json!({"box": {"w": 1, "h": 1, "d": 1}, "notes": "x".repeat(2000)});
        let big_envelope = TaskEnvelope {
            job_id: Uuid::now_v7(),
            kind: JobKind::Model,
            params: big_params,
            submitted_by: "user-1".into(),
            attempt: 1,
            created_at: chrono::Utc::now(),
        };
        let raw = big_envelope.to_json_bytes().unwrap();
        assert!(raw.len() > COMPRESSION_THRESHOLD_BYTES);
        let compressed = gzip(&raw);
        assert!(compressed.len() < raw.len());
    }
}
