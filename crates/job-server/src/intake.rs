//! Job Intake & Routing orchestration (spec.md §2 data flow: "Validator →
//! Rate Limiter → Idempotency Store → Lifecycle Store → Queue Publisher →
//! Lifecycle Store").

use std::sync::Arc;

use chrono::Utc;
use job_core::canon::canonical_hash;
use job_core::idempotency::{validate_idempotency_key, IdempotencyOutcome, IdempotencyStore};
use job_core::ports::JobStore;
use job_core::ratelimit::{SlidingWindowLimiter, Window};
use job_core::validation::{validate, SubmissionEnvelope};
use job_core::{Job, JobError, JobKind};
use job_queue::envelope::TaskEnvelope;
use job_queue::publisher::{PublishOutcome, QueuePublisher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::principal::Principal;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: String,
    pub params: Value,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub chain_cam: bool,
    #[serde(default)]
    pub chain_sim: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub state: String,
    pub duplicate: bool,
}

pub struct JobIntakeService {
    jobs: Arc<dyn JobStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    limiter: Arc<SlidingWindowLimiter>,
    publisher: Arc<QueuePublisher>,
}

impl JobIntakeService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        limiter: Arc<SlidingWindowLimiter>,
        publisher: Arc<QueuePublisher>,
    ) -> Self {
        Self {
            jobs,
            idempotency,
            limiter,
            publisher,
        }
    }

    pub async fn submit(
        &self,
        principal: &Principal,
        request: SubmitJobRequest,
    ) -> Result<SubmitJobResponse, AppError> {
        let kind = JobKind::parse(&request.kind)?;

        if let Some(key) = &request.idempotency_key {
            validate_idempotency_key(key)?;
        }
        if !(-100..=100).contains(&request.priority) {
            return Err(JobError::Range {
                field: "priority".into(),
                reason: format!("{} outside [-100..100]", request.priority),
            }
            .into());
        }

        let envelope = SubmissionEnvelope {
            kind,
            params: &request.params,
            chain_cam: request.chain_cam,
            chain_sim: request.chain_sim,
        };
        validate(&envelope)?;

        self.check_rate_limits(principal, kind).await?;

        let params_hash = canonical_hash(&request.params);

        if let Some(key) = &request.idempotency_key {
            if let Some(existing_job_id) =
                self.classify_existing(principal, kind, key, &params_hash).await?
            {
                return Ok(SubmitJobResponse {
                    job_id: existing_job_id,
                    state: "PENDING".into(),
                    duplicate: true,
                });
            }
        }

        let now = Utc::now();
        let job = Job::new(
            principal.user_id.clone(),
            kind,
            request.params.clone(),
            request.idempotency_key.as_ref().map(|_| params_hash.clone()),
            request.idempotency_key.clone(),
            request.priority,
            now,
        );

        if let Err(err) = self.jobs.insert(&job).await {
            return self.handle_insert_conflict(principal, kind, &request, err).await;
        }

        self.publish(job).await
    }

    async fn check_rate_limits(&self, principal: &Principal, kind: JobKind) -> Result<(), AppError> {
        let now = Utc::now();
        let window = if kind == JobKind::Ai { Window::AiPrompt } else { Window::Submission };

        let per_principal = self.limiter.check(window, &principal.user_id, now).await;
        if !per_principal.allowed {
            return Err(rate_limited(per_principal, now).into());
        }

        let global = self.limiter.check(Window::Global, "global", now).await;
        if !global.allowed {
            return Err(rate_limited(global, now).into());
        }
        Ok(())
    }

    /// Re-resolves an idempotency key against the store, classifying a hit
    /// as a duplicate (matching hash) or a conflict (differing hash).
    async fn classify_existing(
        &self,
        principal: &Principal,
        kind: JobKind,
        key: &str,
        params_hash: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let existing = self
            .idempotency
            .lookup(&principal.user_id, kind.as_str(), key)
            .await
            .map_err(JobError::Internal)?;
        match existing {
            Some((existing_job_id, existing_hash)) => {
                IdempotencyOutcome::classify(existing_job_id, &existing_hash, params_hash)
                    .into_result()
                    .map_err(AppError::from)
            }
            None => Ok(None),
        }
    }

    /// Handles a unique-violation on `(user_id, kind, idempotency_key)` by
    /// re-reading the row (spec.md §4.4: "handle the resulting
    /// unique-violation by re-reading the row"). Any other insert failure
    /// propagates as an internal error.
    async fn handle_insert_conflict(
        &self,
        principal: &Principal,
        kind: JobKind,
        request: &SubmitJobRequest,
        err: anyhow::Error,
    ) -> Result<SubmitJobResponse, AppError> {
        let is_unique_violation = err
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);

        if !is_unique_violation {
            return Err(JobError::Internal(err).into());
        }

        let Some(key) = &request.idempotency_key else {
            return Err(JobError::Internal(err).into());
        };

        let params_hash = canonical_hash(&request.params);
        match self.classify_existing(principal, kind, key, &params_hash).await? {
            Some(existing_job_id) => Ok(SubmitJobResponse {
                job_id: existing_job_id,
                state: "PENDING".into(),
                duplicate: true,
            }),
            None => Err(JobError::Internal(err).into()),
        }
    }

    /// Publishes the already-committed job (spec.md §4.6: "Publisher MUST
    /// be called after the Job row is committed"). A persistent publish
    /// failure leaves the job PENDING for the recovery sweep rather than
    /// rolling back the insert.
    async fn publish(&self, mut job: Job) -> Result<SubmitJobResponse, AppError> {
        let task_envelope = TaskEnvelope {
            job_id: job.id,
            kind: job.kind,
            params: job.params.clone(),
            submitted_by: job.submitted_by.clone(),
            attempt: job.attempts,
            created_at: job.created_at,
        };

        match self.publisher.publish(job.kind, &task_envelope).await {
            PublishOutcome::Published { broker_task_id } => {
                job.mark_queued(broker_task_id, Utc::now())?;
                self.jobs.update(&job).await.map_err(JobError::Internal)?;
                Ok(SubmitJobResponse {
                    job_id: job.id,
                    state: job.state.to_string(),
                    duplicate: false,
                })
            }
            PublishOutcome::PersistentFailure { last_error } => {
                tracing::error!(job_id = %job.id, last_error, "queue publish exhausted retries, job left PENDING");
                Ok(SubmitJobResponse {
                    job_id: job.id,
                    state: job.state.to_string(),
                    duplicate: false,
                })
            }
        }
    }
}

fn rate_limited(decision: job_core::ratelimit::Decision, now: chrono::DateTime<Utc>) -> JobError {
    let retry_after_secs = (decision.reset_at - now).num_seconds().max(0) as u64;
    JobError::RateLimited {
        retry_after_secs,
        limit: decision.limit,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
    }
}
