//! Cancellation Coordinator (spec.md §4.8).
//!
//! Level-triggered, not imperative: the coordinator never touches a
//! worker directly. It flips `cancel_requested` on the Job row and writes a
//! short-TTL signal workers poll between stages (spec.md §6 "Cancellation
//! signal": `cancel:<job_id>=1` plus the `cancel_requested` column).

use std::sync::Arc;

use chrono::Utc;
use job_core::ports::{CancellationSignal, JobStore};
use job_core::LifecycleError;
use uuid::Uuid;

/// Default TTL for the side-channel cancellation signal.
pub const CANCEL_SIGNAL_TTL_SECONDS: u64 = 300;

pub struct CancellationCoordinator {
    jobs: Arc<dyn JobStore>,
    signal: Arc<dyn CancellationSignal>,
}

/// Result of a cancel request: either the job was already terminal (a
/// harmless no-op) or cancellation was freshly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    AlreadyTerminal,
    Requested,
}

impl CancellationCoordinator {
    pub fn new(jobs: Arc<dyn JobStore>, signal: Arc<dyn CancellationSignal>) -> Self {
        Self { jobs, signal }
    }

    /// Idempotent: calling this twice on the same job id is safe (spec.md
    /// §4.8 "the operation is idempotent").
    pub async fn request_cancel(&self, job_id: Uuid) -> anyhow::Result<CancelOutcome> {
        let mut job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(job_id))?;

        if job.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        job.request_cancellation(Utc::now());
        self.jobs.update(&job).await?;
        self.signal.set(job_id, CANCEL_SIGNAL_TTL_SECONDS).await?;
        Ok(CancelOutcome::Requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use job_core::{Job, JobKind};
    use std::sync::Mutex;

    struct FakeJobStore {
        job: Mutex<Job>,
    }

    #[async_trait::async_trait]
    impl JobStore for FakeJobStore {
        async fn insert(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get(&self, _job_id: Uuid) -> anyhow::Result<Option<Job>> {
            Ok(Some(self.job.lock().unwrap().clone()))
        }
        async fn update(&self, job: &Job) -> anyhow::Result<()> {
            *self.job.lock().unwrap() = job.clone();
            Ok(())
        }
        async fn count_running_in_queue(&self, _queue: &str) -> anyhow::Result<u64> {
            Ok(0)
        }
        async fn count_ahead_in_queue(
            &self,
            _queue: &str,
            _priority: i32,
            _created_at: DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            Ok(0)
        }
        async fn list_stuck_pending(&self, _older_than: DateTime<Utc>) -> anyhow::Result<Vec<Job>> {
            Ok(vec![])
        }
    }

    struct FakeSignal {
        set_calls: Mutex<Vec<Uuid>>,
    }

    #[async_trait::async_trait]
    impl CancellationSignal for FakeSignal {
        async fn set(&self, job_id: Uuid, _ttl_seconds: u64) -> anyhow::Result<()> {
            self.set_calls.lock().unwrap().push(job_id);
            Ok(())
        }
        async fn is_set(&self, job_id: Uuid) -> anyhow::Result<bool> {
            Ok(self.set_calls.lock().unwrap().contains(&job_id))
        }
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let job = Job::new("u".into(), JobKind::Model, serde_json::json!({}), None, None, 0, Utc::now());
        let job_id = job.id;
        let jobs = Arc::new(FakeJobStore { job: Mutex::new(job) });
        let signal = Arc::new(FakeSignal { set_calls: Mutex::new(vec![]) });
        let coordinator = CancellationCoordinator::new(jobs, signal);

        assert_eq!(coordinator.request_cancel(job_id).await.unwrap(), CancelOutcome::Requested);
        assert_eq!(coordinator.request_cancel(job_id).await.unwrap(), CancelOutcome::Requested);
    }

    #[tokio::test]
    async fn already_terminal_job_reports_as_such() {
        let mut job = Job::new("u".into(), JobKind::Model, serde_json::json!({}), None, None, 0, Utc::now());
        job.mark_queued("t".into(), Utc::now()).unwrap();
        job.mark_running(Utc::now()).unwrap();
        job.apply_completion(job_core::WorkerOutcome::Success, None, Utc::now()).unwrap();
        let job_id = job.id;
        let jobs = Arc::new(FakeJobStore { job: Mutex::new(job) });
        let signal = Arc::new(FakeSignal { set_calls: Mutex::new(vec![]) });
        let coordinator = CancellationCoordinator::new(jobs, signal);

        assert_eq!(coordinator.request_cancel(job_id).await.unwrap(), CancelOutcome::AlreadyTerminal);
    }
}
