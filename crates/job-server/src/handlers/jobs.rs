//! Job submission, status, cancellation, and the worker-facing progress and
//! completion endpoints.

use std::sync::Arc;

use axum::extract::Path;
use axum::{Extension, Json};
use chrono::Utc;
use job_core::ports::{ArtefactStore, JobStore};
use job_core::{Artefact, ArtefactType, Job, LastError, LifecycleError, WorkerOutcome};
use job_queue::coordinator::{CancelOutcome, CancellationCoordinator};
use job_queue::position::QueuePositionService;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::intake::{JobIntakeService, SubmitJobRequest, SubmitJobResponse};
use crate::principal::Principal;

pub async fn submit_job(
    principal: Principal,
    Extension(intake): Extension<Arc<JobIntakeService>>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, AppError> {
    let response = intake.submit(&principal, request).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub state: String,
    pub priority: i32,
    pub attempts: u32,
    pub max_retries: u32,
    pub cancel_requested: bool,
    pub progress_percent: u8,
    pub progress_step: Option<String>,
    pub progress_message: Option<String>,
    pub last_error: Option<LastError>,
    pub queue_position: Option<u64>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

async fn load_job(jobs: &Arc<dyn JobStore>, job_id: Uuid) -> Result<Job, AppError> {
    jobs.get(job_id)
        .await
        .map_err(job_core::LifecycleError::Storage)?
        .ok_or(LifecycleError::NotFound(job_id))
        .map_err(AppError::from)
}

pub async fn get_job_status(
    _principal: Principal,
    Path(job_id): Path<Uuid>,
    Extension(jobs): Extension<Arc<dyn JobStore>>,
    Extension(positions): Extension<Arc<QueuePositionService>>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job = load_job(&jobs, job_id).await?;
    let queue_position = positions.position_of(&job).await.map_err(LifecycleError::Storage)?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        state: job.state.to_string(),
        priority: job.priority,
        attempts: job.attempts,
        max_retries: job.max_retries,
        cancel_requested: job.cancel_requested,
        progress_percent: job.progress.percent,
        progress_step: job.progress.step,
        progress_message: job.progress.message,
        last_error: job.last_error,
        queue_position,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub outcome: &'static str,
}

/// Worker pickup checkpoint: `QUEUED → RUNNING` (spec.md §4.5 "QUEUED→RUNNING
/// only by a worker reporting pickup").
pub async fn report_pickup(
    _principal: Principal,
    Path(job_id): Path<Uuid>,
    Extension(jobs): Extension<Arc<dyn JobStore>>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let mut job = load_job(&jobs, job_id).await?;
    let now = Utc::now();
    job.mark_running(now)?;
    jobs.update(&job).await.map_err(LifecycleError::Storage)?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        state: job.state.to_string(),
        priority: job.priority,
        attempts: job.attempts,
        max_retries: job.max_retries,
        cancel_requested: job.cancel_requested,
        progress_percent: job.progress.percent,
        progress_step: job.progress.step,
        progress_message: job.progress.message,
        last_error: job.last_error,
        queue_position: None,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

pub async fn cancel_job(
    _principal: Principal,
    Path(job_id): Path<Uuid>,
    Extension(coordinator): Extension<Arc<CancellationCoordinator>>,
) -> Result<Json<CancelJobResponse>, AppError> {
    let outcome = coordinator.request_cancel(job_id).await.map_err(LifecycleError::Storage)?;
    Ok(Json(CancelJobResponse {
        outcome: match outcome {
            CancelOutcome::AlreadyTerminal => "ALREADY_TERMINAL",
            CancelOutcome::Requested => "REQUESTED",
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub percent: u8,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn report_progress(
    _principal: Principal,
    Path(job_id): Path<Uuid>,
    Extension(jobs): Extension<Arc<dyn JobStore>>,
    Json(request): Json<ProgressRequest>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let mut job = load_job(&jobs, job_id).await?;
    let now = Utc::now();
    // Every progress report is a checkpoint: a worker observing
    // `cancel_requested` here transitions the job within this one stage
    // rather than applying the reported percent (spec.md §4.8/§5 "Workers
    // must observe within one pipeline stage").
    if job.cancel_requested && !job.state.is_terminal() {
        job.observe_cancellation(now)?;
    } else {
        job.apply_progress(request.percent, request.step, request.message, now)?;
    }
    jobs.update(&job).await.map_err(LifecycleError::Storage)?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        state: job.state.to_string(),
        priority: job.priority,
        attempts: job.attempts,
        max_retries: job.max_retries,
        cancel_requested: job.cancel_requested,
        progress_percent: job.progress.percent,
        progress_step: job.progress.step,
        progress_message: job.progress.message,
        last_error: job.last_error,
        queue_position: None,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOutcome {
    Success,
    Fail,
    Timeout,
}

impl From<WireOutcome> for WorkerOutcome {
    fn from(outcome: WireOutcome) -> Self {
        match outcome {
            WireOutcome::Success => WorkerOutcome::Success,
            WireOutcome::Fail => WorkerOutcome::Fail,
            WireOutcome::Timeout => WorkerOutcome::Timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireArtefactType {
    Model,
    Gcode,
    Report,
    Log,
    Other,
}

impl From<WireArtefactType> for ArtefactType {
    fn from(t: WireArtefactType) -> Self {
        match t {
            WireArtefactType::Model => ArtefactType::Model,
            WireArtefactType::Gcode => ArtefactType::Gcode,
            WireArtefactType::Report => ArtefactType::Report,
            WireArtefactType::Log => ArtefactType::Log,
            WireArtefactType::Other => ArtefactType::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArtefactPayload {
    #[serde(rename = "type")]
    pub artefact_type: WireArtefactType,
    pub blob_key: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub outcome: WireOutcome,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub artefacts: Vec<ArtefactPayload>,
}

pub async fn report_completion(
    _principal: Principal,
    Path(job_id): Path<Uuid>,
    Extension(jobs): Extension<Arc<dyn JobStore>>,
    Extension(artefacts): Extension<Arc<dyn ArtefactStore>>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let mut job = load_job(&jobs, job_id).await?;
    let now = Utc::now();
    // Artefacts must already be persisted before the transition lands
    // (spec.md §4.5 "artefacts must already be persisted"), so write them
    // ahead of the state update; completion itself is idempotent on
    // `job_id`, so a retried completion call would otherwise re-insert.
    if job.state == job_core::JobState::Running {
        for payload in &request.artefacts {
            let artefact = Artefact::new(
                job_id,
                payload.artefact_type.into(),
                payload.blob_key.clone(),
                payload.sha256.clone(),
                payload.size,
                now,
            );
            artefacts.insert(&artefact).await.map_err(LifecycleError::Storage)?;
        }
    }
    job.apply_completion(request.outcome.into(), request.last_error, now)?;
    jobs.update(&job).await.map_err(LifecycleError::Storage)?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        state: job.state.to_string(),
        priority: job.priority,
        attempts: job.attempts,
        max_retries: job.max_retries,
        cancel_requested: job.cancel_requested,
        progress_percent: job.progress.percent,
        progress_step: job.progress.step,
        progress_message: job.progress.message,
        last_error: job.last_error,
        queue_position: None,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}
