//! Router construction for the job-orchestration server.
//!
//! Grounded on `sem_os_server::router::build_router`'s public/protected
//! split and `Extension` wiring — the shape is the same, just with the
//! `x-user-id` extractor in place of JWT middleware (see `principal.rs`)
//! and webhook ingress authenticated by signature rather than principal.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use job_core::ports::{ArtefactStore, JobStore};
use job_queue::coordinator::CancellationCoordinator;
use job_queue::position::QueuePositionService;
use job_webhooks::WebhookProcessor;

use crate::handlers;
use crate::intake::JobIntakeService;

/// Everything the router needs to hand out via `Extension`.
pub struct RouterState {
    pub intake: Arc<JobIntakeService>,
    pub jobs: Arc<dyn JobStore>,
    pub artefacts: Arc<dyn ArtefactStore>,
    pub positions: Arc<QueuePositionService>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub webhook_processor: Arc<WebhookProcessor>,
}

pub fn build_router(state: RouterState) -> Router {
    let jobs = Router::new()
        .route("/jobs", post(handlers::jobs::submit_job))
        .route("/jobs/:id", get(handlers::jobs::get_job_status))
        .route("/jobs/:id/cancel", post(handlers::jobs::cancel_job))
        .route("/jobs/:id/start", post(handlers::jobs::report_pickup))
        .route("/jobs/:id/progress", post(handlers::jobs::report_progress))
        .route("/jobs/:id/complete", post(handlers::jobs::report_completion))
        .layer(Extension(state.intake))
        .layer(Extension(state.jobs))
        .layer(Extension(state.artefacts))
        .layer(Extension(state.positions))
        .layer(Extension(state.coordinator));

    let webhooks = Router::new()
        .route("/webhooks/:provider", post(handlers::webhooks::receive_webhook))
        .layer(Extension(state.webhook_processor));

    let health = Router::new().route("/health", get(handlers::health::health));

    health.merge(jobs).merge(webhooks)
}
