//! Immutable worker-output record (spec.md §3 "Artefact").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtefactType {
    Model,
    Gcode,
    Report,
    Log,
    Other,
}

/// Created only while the owning job is RUNNING or transitioning into
/// COMPLETED (spec.md §3). Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artefact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub artefact_type: ArtefactType,
    pub blob_key: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Artefact {
    pub fn new(
        job_id: Uuid,
        artefact_type: ArtefactType,
        blob_key: String,
        sha256: String,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            artefact_type,
            blob_key,
            sha256,
            size_bytes,
            created_at: now,
        }
    }
}
