//! The Job record and its state machine.
//!
//! Grounded on `ob-workflow::state::WorkflowInstance::transition_to` (the
//! mutate-in-place-and-push-history shape) and `ob-workflow::engine`'s
//! explicit `transition`/`execute_transition` split between "is this legal"
//! and "apply it."

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::router::JobKind;

/// Job lifecycle state (spec.md §3/§4.5). `Terminal` states never transition
/// further except as explicitly modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::Timeout
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

/// Outcome a worker reports on completion (spec.md §6 "Worker completion
/// contract").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerOutcome {
    Success,
    Fail,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub percent: u8,
    pub step: Option<String>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            percent: 0,
            step: None,
            message: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
}

/// The authoritative job record (spec.md §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub submitted_by: String,
    pub kind: JobKind,
    pub state: JobState,
    pub priority: i32,
    pub attempts: u32,
    pub max_retries: u32,
    pub timeout_seconds: u32,
    pub cancel_requested: bool,
    pub progress: Progress,
    pub params: serde_json::Value,
    pub params_hash: Option<String>,
    pub idempotency_key: Option<String>,
    pub broker_task_id: Option<String>,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Job {
    pub fn new(
        submitted_by: String,
        kind: JobKind,
        params: serde_json::Value,
        params_hash: Option<String>,
        idempotency_key: Option<String>,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        let route = kind.route();
        Self {
            id: Uuid::now_v7(),
            submitted_by,
            kind,
            state: JobState::Pending,
            priority,
            attempts: 1,
            max_retries: route.max_retries,
            timeout_seconds: route.timeout_seconds,
            cancel_requested: false,
            progress: Progress::initial(now),
            params,
            params_hash,
            idempotency_key,
            broker_task_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            metadata: serde_json::json!({}),
        }
    }

    /// `PENDING → QUEUED`, gated on the Queue Publisher's acknowledgement
    /// (spec.md §4.5).
    pub fn mark_queued(&mut self, broker_task_id: String, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.require_transition(JobState::Pending, JobState::Queued)?;
        self.state = JobState::Queued;
        self.broker_task_id = Some(broker_task_id);
        self.touch(now);
        Ok(())
    }

    /// `QUEUED → RUNNING`, gated on a worker reporting pickup.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.require_transition(JobState::Queued, JobState::Running)?;
        self.state = JobState::Running;
        self.started_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Applies a progress checkpoint. Rejected once terminal; non-monotone
    /// percent is silently discarded per spec.md §4.5 ("progress writes are
    /// idempotent at the percent level").
    pub fn apply_progress(
        &mut self,
        percent: u8,
        step: Option<String>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::Terminal {
                job_id: self.id,
                state: self.state.to_string(),
            });
        }
        if percent < self.progress.percent {
            return Ok(());
        }
        self.progress = Progress {
            percent,
            step,
            message,
            updated_at: now,
        };
        self.touch(now);
        Ok(())
    }

    /// Applies a worker completion report (spec.md §6). Idempotent on
    /// `job_id`: calling this again on an already-terminal job is a no-op
    /// rather than an error, matching the completion contract's
    /// idempotence guarantee.
    pub fn apply_completion(
        &mut self,
        outcome: WorkerOutcome,
        last_error: Option<LastError>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        match outcome {
            WorkerOutcome::Success => {
                self.require_transition(JobState::Running, JobState::Completed)?;
                self.state = JobState::Completed;
                self.progress.percent = 100;
            }
            WorkerOutcome::Fail | WorkerOutcome::Timeout => {
                let failing_into = if outcome == WorkerOutcome::Timeout {
                    JobState::Timeout
                } else {
                    JobState::Failed
                };
                if self.attempts < self.max_retries + 1 {
                    self.attempts += 1;
                    self.state = JobState::Pending;
                    self.broker_task_id = None;
                    self.progress = Progress::initial(now);
                } else {
                    self.state = failing_into;
                }
                self.last_error = last_error;
            }
        }
        self.finished_at = if self.state.is_terminal() { Some(now) } else { None };
        self.touch(now);
        Ok(())
    }

    /// Any non-terminal state may move to `CANCELLED`, but only once the
    /// worker observes `cancel_requested` at a checkpoint (spec.md §4.5/§5).
    /// The coordinator itself only flips `cancel_requested`; this method is
    /// the worker-side observation.
    pub fn observe_cancellation(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::Terminal {
                job_id: self.id,
                state: self.state.to_string(),
            });
        }
        if !self.cancel_requested {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                to: JobState::Cancelled.to_string(),
            });
        }
        self.state = JobState::Cancelled;
        self.finished_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Sets `cancel_requested`. Idempotent: calling twice is harmless
    /// (spec.md §4.8).
    pub fn request_cancellation(&mut self, now: DateTime<Utc>) {
        if !self.state.is_terminal() {
            self.cancel_requested = true;
            self.touch(now);
        }
    }

    fn require_transition(&self, expected_from: JobState, to: JobState) -> Result<(), LifecycleError> {
        if self.state != expected_from {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_job(now: DateTime<Utc>) -> Job {
        Job::new(
            "user-1".into(),
            JobKind::Model,
            serde_json::json!({"box": {"w": 100}}),
            Some("hash".into()),
            Some("idem-key".into()),
            5,
            now,
        )
    }

    #[test]
    fn queued_then_running_then_completed() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.mark_queued("task-1".into(), t0 + Duration::seconds(1)).unwrap();
        job.mark_running(t0 + Duration::seconds(2)).unwrap();
        job.apply_completion(WorkerOutcome::Success, None, t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress.percent, 100);
    }

    #[test]
    fn terminal_job_rejects_progress() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.mark_queued("task-1".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        job.apply_completion(WorkerOutcome::Success, None, t0).unwrap();
        let err = job.apply_progress(50, None, None, t0).unwrap_err();
        assert!(matches!(err, LifecycleError::Terminal { .. }));
    }

    #[test]
    fn non_monotone_progress_is_discarded_not_errored() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.mark_queued("t".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        job.apply_progress(60, None, None, t0).unwrap();
        job.apply_progress(30, None, None, t0).unwrap();
        assert_eq!(job.progress.percent, 60);
    }

    #[test]
    fn failure_retries_until_max_then_terminal() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.max_retries = 1;
        job.mark_queued("t".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        job.apply_completion(
            WorkerOutcome::Fail,
            Some(LastError { code: "E".into(), message: "boom".into() }),
            t0,
        )
        .unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 2);

        job.mark_queued("t2".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        job.apply_completion(
            WorkerOutcome::Fail,
            Some(LastError { code: "E".into(), message: "boom again".into() }),
            t0,
        )
        .unwrap();
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn cancellation_requires_prior_request() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.mark_queued("t".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        assert!(job.observe_cancellation(t0).is_err());
        job.request_cancellation(t0);
        job.observe_cancellation(t0).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn cancellation_request_is_idempotent() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.request_cancellation(t0);
        job.request_cancellation(t0);
        assert!(job.cancel_requested);
    }

    #[test]
    fn completion_after_terminal_is_a_noop_not_an_error() {
        let t0 = Utc::now();
        let mut job = new_job(t0);
        job.mark_queued("t".into(), t0).unwrap();
        job.mark_running(t0).unwrap();
        job.apply_completion(WorkerOutcome::Success, None, t0).unwrap();
        job.apply_completion(WorkerOutcome::Success, None, t0).unwrap();
        assert_eq!(job.state, JobState::Completed);
    }
}
