//! Domain types, state machine, router table, validator, canonical hashing,
//! idempotency, and rate limiting for the job-orchestration core.
//!
//! This crate is pure: no I/O, no database, no broker client. Everything
//! here is either a value type, a pure function, or a port trait that
//! `job-postgres` implements. Mirrors the `sem_os_core` / `ob-workflow`
//! split in the teacher workspace, where the domain crate never links
//! against `sqlx` directly.

pub mod canon;
pub mod cancel_signal;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod ports;
pub mod ratelimit;
pub mod router;
pub mod validation;

pub use cancel_signal::LocalCancellationSignal;
pub use error::{JobError, LifecycleError, NotificationError, WebhookError};
pub use model::{Artefact, ArtefactType, Job, JobState, LastError, License, LicenseStatus, Progress, WorkerOutcome};
pub use router::{JobKind, RouterEntry, QUEUE_REVERSE_INDEX};
