//! `JobStore`, `ArtefactStore` and `IdempotencyStore` against Postgres.
//!
//! All SQL here is runtime-checked (`sqlx::query`/`sqlx::query_as`, not
//! `sqlx::query!`) to avoid a compile-time database requirement, following
//! `sem_os_postgres::store`'s stated convention.

use chrono::{DateTime, Utc};
use job_core::idempotency::IdempotencyStore;
use job_core::model::{Artefact, ArtefactType, Job, JobState, LastError, Progress};
use job_core::ports::{ArtefactStore, JobStore};
use job_core::router::JobKind;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_state_to_str(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "PENDING",
        JobState::Queued => "QUEUED",
        JobState::Running => "RUNNING",
        JobState::Completed => "COMPLETED",
        JobState::Failed => "FAILED",
        JobState::Cancelled => "CANCELLED",
        JobState::Timeout => "TIMEOUT",
    }
}

fn job_state_from_str(raw: &str) -> anyhow::Result<JobState> {
    Ok(match raw {
        "PENDING" => JobState::Pending,
        "QUEUED" => JobState::Queued,
        "RUNNING" => JobState::Running,
        "COMPLETED" => JobState::Completed,
        "FAILED" => JobState::Failed,
        "CANCELLED" => JobState::Cancelled,
        "TIMEOUT" => JobState::Timeout,
        other => anyhow::bail!("unknown job state in database row: {other}"),
    })
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> anyhow::Result<Job> {
    let kind_str: String = row.try_get("kind")?;
    let state_str: String = row.try_get("state")?;
    Ok(Job {
        id: row.try_get("id")?,
        submitted_by: row.try_get("submitted_by")?,
        kind: JobKind::parse(&kind_str).map_err(|e| anyhow::anyhow!(e))?,
        state: job_state_from_str(&state_str)?,
        priority: row.try_get("priority")?,
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        max_retries: row.try_get::<i32, _>("max_retries")? as u32,
        timeout_seconds: row.try_get::<i32, _>("timeout_seconds")? as u32,
        cancel_requested: row.try_get("cancel_requested")?,
        progress: Progress {
            percent: row.try_get::<i16, _>("progress_percent")? as u8,
            step: row.try_get("progress_step")?,
            message: row.try_get("progress_message")?,
            updated_at: row.try_get("progress_updated_at")?,
        },
        params: row.try_get("params")?,
        params_hash: row.try_get("params_hash")?,
        idempotency_key: row.try_get("idempotency_key")?,
        broker_task_id: row.try_get("broker_task_id")?,
        last_error: match row.try_get::<Option<String>, _>("last_error_code")? {
            Some(code) => Some(LastError {
                code,
                message: row.try_get::<Option<String>, _>("last_error_message")?.unwrap_or_default(),
            }),
            None => None,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        metadata: row.try_get("metadata")?,
    })
}

#[async_trait::async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, submitted_by, kind, state, priority, attempts, max_retries,
                timeout_seconds, cancel_requested, progress_percent, progress_step,
                progress_message, progress_updated_at, params, params_hash,
                idempotency_key, broker_task_id, last_error_code, last_error_message,
                created_at, updated_at, started_at, finished_at, metadata
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(job.id)
        .bind(&job.submitted_by)
        .bind(job.kind.as_str())
        .bind(job_state_to_str(job.state))
        .bind(job.priority)
        .bind(job.attempts as i32)
        .bind(job.max_retries as i32)
        .bind(job.timeout_seconds as i32)
        .bind(job.cancel_requested)
        .bind(job.progress.percent as i16)
        .bind(&job.progress.step)
        .bind(&job.progress.message)
        .bind(job.progress.updated_at)
        .bind(&job.params)
        .bind(&job.params_hash)
        .bind(&job.idempotency_key)
        .bind(&job.broker_task_id)
        .bind(job.last_error.as_ref().map(|e| e.code.clone()))
        .bind(job.last_error.as_ref().map(|e| e.message.clone()))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn update(&self, job: &Job) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                state = $2, attempts = $3, cancel_requested = $4,
                progress_percent = $5, progress_step = $6, progress_message = $7,
                progress_updated_at = $8, broker_task_id = $9,
                last_error_code = $10, last_error_message = $11,
                updated_at = $12, started_at = $13, finished_at = $14
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job_state_to_str(job.state))
        .bind(job.attempts as i32)
        .bind(job.cancel_requested)
        .bind(job.progress.percent as i16)
        .bind(&job.progress.step)
        .bind(&job.progress.message)
        .bind(job.progress.updated_at)
        .bind(&job.broker_task_id)
        .bind(job.last_error.as_ref().map(|e| e.code.clone()))
        .bind(job.last_error.as_ref().map(|e| e.message.clone()))
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_running_in_queue(&self, queue: &str) -> anyhow::Result<u64> {
        let kinds = kinds_for_queue(queue);
        let row = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE kind = ANY($1) AND state = 'RUNNING'")
            .bind(&kinds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn count_ahead_in_queue(&self, queue: &str, priority: i32, created_at: DateTime<Utc>) -> anyhow::Result<u64> {
        let kinds = kinds_for_queue(queue);
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM jobs
            WHERE kind = ANY($1)
              AND state IN ('PENDING', 'QUEUED')
              AND (priority > $2 OR (priority = $2 AND created_at < $3))
            "#,
        )
        .bind(&kinds)
        .bind(priority)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn list_stuck_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE state = 'PENDING' AND created_at < $1")
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }
}

fn kinds_for_queue(queue: &str) -> Vec<String> {
    job_core::QUEUE_REVERSE_INDEX
        .get(queue)
        .map(|kinds| kinds.iter().map(|k| k.as_str().to_string()).collect())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl IdempotencyStore for PgJobStore {
    async fn lookup(&self, user_id: &str, kind: &str, idempotency_key: &str) -> anyhow::Result<Option<(Uuid, String)>> {
        let row = sqlx::query(
            "SELECT id, params_hash FROM jobs WHERE submitted_by = $1 AND kind = $2 AND idempotency_key = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                let hash: Option<String> = row.try_get("params_hash")?;
                Ok(Some((id, hash.unwrap_or_default())))
            }
            None => Ok(None),
        }
    }
}

pub struct PgArtefactStore {
    pool: PgPool,
}

impl PgArtefactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn artefact_type_to_str(t: ArtefactType) -> &'static str {
    match t {
        ArtefactType::Model => "model",
        ArtefactType::Gcode => "gcode",
        ArtefactType::Report => "report",
        ArtefactType::Log => "log",
        ArtefactType::Other => "other",
    }
}

fn artefact_type_from_str(raw: &str) -> ArtefactType {
    match raw {
        "model" => ArtefactType::Model,
        "gcode" => ArtefactType::Gcode,
        "report" => ArtefactType::Report,
        "log" => ArtefactType::Log,
        _ => ArtefactType::Other,
    }
}

#[async_trait::async_trait]
impl ArtefactStore for PgArtefactStore {
    async fn insert(&self, artefact: &Artefact) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO artefacts (id, job_id, artefact_type, blob_key, sha256, size_bytes, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(artefact.id)
        .bind(artefact.job_id)
        .bind(artefact_type_to_str(artefact.artefact_type))
        .bind(&artefact.blob_key)
        .bind(&artefact.sha256)
        .bind(artefact.size_bytes as i64)
        .bind(artefact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Artefact>> {
        let rows = sqlx::query("SELECT * FROM artefacts WHERE job_id = $1 ORDER BY created_at ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Artefact {
                    id: row.try_get("id")?,
                    job_id: row.try_get("job_id")?,
                    artefact_type: artefact_type_from_str(row.try_get::<String, _>("artefact_type")?.as_str()),
                    blob_key: row.try_get("blob_key")?,
                    sha256: row.try_get("sha256")?,
                    size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
