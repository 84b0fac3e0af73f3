//! Queue Position Service (spec.md §4.7).

use std::sync::Arc;

use job_core::ports::JobStore;
use job_core::{Job, JobState};

pub struct QueuePositionService {
    jobs: Arc<dyn JobStore>,
}

impl QueuePositionService {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// `position = (jobs RUNNING in the same queue) + (jobs PENDING/QUEUED
    /// in the same queue that precede `job` by priority then FIFO) + 1`.
    /// Returns `Some(0)` if `job` itself is RUNNING, `None` if terminal.
    pub async fn position_of(&self, job: &Job) -> anyhow::Result<Option<u64>> {
        if job.state == JobState::Running {
            return Ok(Some(0));
        }
        if job.state.is_terminal() {
            return Ok(None);
        }

        let queue = job.kind.route().queue;
        let running = self.jobs.count_running_in_queue(queue).await?;
        let ahead = self
            .jobs
            .count_ahead_in_queue(queue, job.priority, job.created_at)
            .await?;
        Ok(Some(running + ahead + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use job_core::JobKind;
    use uuid::Uuid;

    struct FakeJobStore {
        running: u64,
        ahead: u64,
    }

    #[async_trait::async_trait]
    impl JobStore for FakeJobStore {
        async fn insert(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get(&self, _job_id: Uuid) -> anyhow::Result<Option<Job>> {
            Ok(None)
        }
        async fn update(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }
        async fn count_running_in_queue(&self, _queue: &str) -> anyhow::Result<u64> {
            Ok(self.running)
        }
        async fn count_ahead_in_queue(
            &self,
            _queue: &str,
            _priority: i32,
            _created_at: DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            Ok(self.ahead)
        }
        async fn list_stuck_pending(&self, _older_than: DateTime<Utc>) -> anyhow::Result<Vec<Job>> {
            Ok(vec![])
        }
    }

    fn pending_job() -> Job {
        Job::new(
            "user-1".into(),
            JobKind::Model,
            serde_json::json!({}),
            None,
            None,
            5,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn running_job_reports_zero() {
        let service = QueuePositionService::new(Arc::new(FakeJobStore { running: 3, ahead: 0 }));
        let mut job = pending_job();
        job.mark_queued("t".into(), Utc::now()).unwrap();
        job.mark_running(Utc::now()).unwrap();
        assert_eq!(service.position_of(&job).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn terminal_job_reports_none() {
        let service = QueuePositionService::new(Arc::new(FakeJobStore { running: 0, ahead: 0 }));
        let mut job = pending_job();
        job.mark_queued("t".into(), Utc::now()).unwrap();
        job.mark_running(Utc::now()).unwrap();
        job.apply_completion(job_core::WorkerOutcome::Success, None, Utc::now())
            .unwrap();
        assert_eq!(service.position_of(&job).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pending_job_position_combines_running_and_ahead() {
        let service = QueuePositionService::new(Arc::new(FakeJobStore { running: 1, ahead: 2 }));
        let job = pending_job();
        assert_eq!(service.position_of(&job).await.unwrap(), Some(4));
    }
}
