//! Structured error taxonomy for the job-orchestration core.
//!
//! Each variant carries the stable wire code from spec §6/§7 so that the
//! HTTP adapter (`job-server`) and any future non-HTTP adapter agree on what
//! goes back to the client. Internal code is always English; Turkish
//! display text is attached at the HTTP boundary, not here.

use uuid::Uuid;

/// Errors raised by intake, routing, validation, and idempotency.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown job kind: {0}")]
    KindUnknown(String),

    #[error("missing required field: {0}")]
    FieldMissing(String),

    #[error("field {field} has wrong type: expected {expected}")]
    FieldType { field: String, expected: String },

    #[error("field {field} out of range: {reason}")]
    Range { field: String, reason: String },

    #[error("cross-field validation failed: {0}")]
    CrossField(String),

    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("idempotency conflict with existing job {existing_job_id}")]
    IdempotencyConflict { existing_job_id: Uuid },

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        remaining: u32,
        reset_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl JobError {
    /// Stable wire code from spec.md §6, e.g. `ERR-JOB-422`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KindUnknown(_) => "ERR-JOB-400",
            Self::FieldMissing(_)
            | Self::FieldType { .. }
            | Self::Range { .. }
            | Self::CrossField(_) => "ERR-JOB-422",
            Self::PayloadTooLarge { .. } => "ERR-JOB-413",
            Self::IdempotencyConflict { .. } => "ERR-JOB-409",
            Self::RateLimited { .. } => "ERR-JOB-429",
            Self::Internal(_) => "ERR-JOB-500",
        }
    }

    /// True for errors a client should not retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Internal(_))
    }
}

/// Errors raised while applying a worker report or a cancellation request
/// against the Job Lifecycle Store.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {job_id} is terminal ({state}); update rejected")]
    Terminal { job_id: Uuid, state: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Errors raised by the notification scanner/dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("no template for kind={kind} channel={channel:?} language={language}")]
    TemplateNotFound {
        kind: String,
        channel: String,
        language: String,
    },

    #[error("render error: {0}")]
    Render(String),

    #[error("provider transient failure: {code} {message}")]
    ProviderTransient { code: String, message: String },

    #[error("provider permanent failure: {code} {message}")]
    ProviderPermanent { code: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Errors raised by the webhook dedup & processor pipeline. Variant names
/// match spec.md §6 wire codes exactly.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("missing event_id")]
    MissingEventId,

    #[error("missing provider_payment_id")]
    MissingPaymentId,

    #[error("payment not found for provider={provider} provider_payment_id={provider_payment_id}")]
    PaymentNotFound {
        provider: String,
        provider_payment_id: String,
    },

    #[error("idempotency error: {0}")]
    IdempotencyError(String),

    #[error("critical processing error: {0}")]
    Critical(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::MissingEventId => "missing_event_id",
            Self::MissingPaymentId => "missing_payment_id",
            Self::PaymentNotFound { .. } => "payment_not_found",
            Self::IdempotencyError(_) => "idempotency_error",
            Self::Critical(_) => "critical_processing_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidSignature | Self::MissingEventId | Self::MissingPaymentId => 400,
            Self::PaymentNotFound { .. } => 404,
            Self::IdempotencyError(_) => 409,
            Self::Critical(_) => 500,
        }
    }
}
