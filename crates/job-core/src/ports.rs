//! Repository port traits. `job-postgres` implements these against
//! `sqlx::PgPool`; `job-server` wires the implementations in behind
//! `Arc<dyn ...>`, following the `PgStores` / trait-object wiring pattern in
//! `sem_os_server::main`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Artefact, Job, License};
use crate::router::JobKind;

/// CRUD + query surface over the Job Lifecycle Store (spec.md §4.5).
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> anyhow::Result<()>;
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>>;
    async fn update(&self, job: &Job) -> anyhow::Result<()>;

    /// Jobs in `queue` with status RUNNING, used by the Queue Position
    /// Service (spec.md §4.7).
    async fn count_running_in_queue(&self, queue: &str) -> anyhow::Result<u64>;

    /// Jobs in `queue` that are PENDING/QUEUED and precede `job` in
    /// priority+FIFO order (spec.md §4.7's position formula).
    async fn count_ahead_in_queue(
        &self,
        queue: &str,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    /// Jobs still PENDING after a publisher failure, for the recovery sweep
    /// (spec.md §4.6: "the Job is left in PENDING so a recovery pass can
    /// re-publish").
    async fn list_stuck_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Job>>;
}

#[async_trait::async_trait]
pub trait ArtefactStore: Send + Sync {
    async fn insert(&self, artefact: &Artefact) -> anyhow::Result<()>;
    async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Artefact>>;
}

/// Read-only access to the licensing subsystem's entity, scoped to what the
/// Notification Scanner needs (spec.md §3 "Ownership": "A License is shared
/// by the licensing subsystem and read-only from the core's notification
/// scanner").
#[async_trait::async_trait]
pub trait LicenseReader: Send + Sync {
    /// Active licenses whose `ends_at` falls within the half-open UTC day
    /// window `[window_start, window_end)` (spec.md §4.9 step 1).
    async fn expiring_within(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<License>>;
}

/// Signals the Cancellation Coordinator writes so in-flight workers can
/// observe a cancel request without polling the database (spec.md §4.8,
/// §6 "Cancellation signal").
#[async_trait::async_trait]
pub trait CancellationSignal: Send + Sync {
    async fn set(&self, job_id: Uuid, ttl_seconds: u64) -> anyhow::Result<()>;
    async fn is_set(&self, job_id: Uuid) -> anyhow::Result<bool>;
}

/// Exposed so `job-server` can fan a startup-time completeness check across
/// every `JobKind` without depending on the router module directly.
pub fn all_job_kinds() -> &'static [JobKind] {
    JobKind::all()
}
