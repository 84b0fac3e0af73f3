//! Idempotency key handling (spec.md §4.4).
//!
//! The key shape and the "REQUIRED for deduplication" framing mirror
//! `ob-workflow::task_queue::TaskResultRow::idempotency_key`. The
//! hit/conflict/miss decision tree is this core's own addition over the
//! teacher's simpler row-dedup, since spec.md additionally requires a
//! payload-hash comparison on hit.

use uuid::Uuid;

use crate::error::JobError;

pub const MIN_KEY_LEN: usize = 16;
pub const MAX_KEY_LEN: usize = 255;

/// Validates the wire-submitted idempotency key length (spec.md §6:
/// `idempotency_key?: string[16..255]`).
pub fn validate_idempotency_key(key: &str) -> Result<(), JobError> {
    let len = key.chars().count();
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len) {
        return Err(JobError::Range {
            field: "idempotency_key".into(),
            reason: format!("length {len} outside [{MIN_KEY_LEN}..{MAX_KEY_LEN}]"),
        });
    }
    Ok(())
}

/// What an idempotency lookup found prior to insertion (spec.md §4.4).
#[derive(Debug, Clone)]
pub enum IdempotencyOutcome {
    /// No existing row for `(user_id, kind, idempotency_key)` — proceed to insert.
    Miss,
    /// An existing row with a matching `params_hash` — return its job id as a duplicate.
    HitMatching { existing_job_id: Uuid },
    /// An existing row whose `params_hash` differs — the caller replayed the
    /// key with a different payload.
    HitConflicting { existing_job_id: Uuid },
}

impl IdempotencyOutcome {
    /// Classifies a looked-up row against the incoming request's hash.
    pub fn classify(existing_job_id: Uuid, existing_hash: &str, incoming_hash: &str) -> Self {
        if existing_hash == incoming_hash {
            IdempotencyOutcome::HitMatching { existing_job_id }
        } else {
            IdempotencyOutcome::HitConflicting { existing_job_id }
        }
    }

    pub fn into_result(self) -> Result<Option<Uuid>, JobError> {
        match self {
            IdempotencyOutcome::Miss => Ok(None),
            IdempotencyOutcome::HitMatching { existing_job_id } => Ok(Some(existing_job_id)),
            IdempotencyOutcome::HitConflicting { existing_job_id } => {
                Err(JobError::IdempotencyConflict { existing_job_id })
            }
        }
    }
}

/// Port the persistence layer implements for idempotency lookups. Kept
/// separate from the general `JobStore` port (see `ports.rs`) because the
/// lookup+insert race (spec.md §4.4: "handle the resulting unique-violation
/// by re-reading the row") is a distinct concern from general job CRUD.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn lookup(
        &self,
        user_id: &str,
        kind: &str,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<(Uuid, String)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_length_bounds() {
        assert!(validate_idempotency_key(&"a".repeat(15)).is_err());
        assert!(validate_idempotency_key(&"a".repeat(16)).is_ok());
        assert!(validate_idempotency_key(&"a".repeat(255)).is_ok());
        assert!(validate_idempotency_key(&"a".repeat(256)).is_err());
    }

    #[test]
    fn matching_hash_is_a_duplicate_not_a_conflict() {
        let id = Uuid::now_v7();
        let outcome = IdempotencyOutcome::classify(id, "h1", "h1");
        assert_eq!(outcome.into_result().unwrap(), Some(id));
    }

    #[test]
    fn differing_hash_is_a_conflict() {
        let id = Uuid::now_v7();
        let outcome = IdempotencyOutcome::classify(id, "h1", "h2");
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, JobError::IdempotencyConflict { existing_job_id } if existing_job_id == id));
    }
}
