//! The task envelope published to the broker (spec.md §6).

use chrono::{DateTime, Utc};
use job_core::JobKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirrors `job_validator.py::publish_job_task`'s `task_args` dict, field
/// for field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub params: serde_json::Value,
    pub submitted_by: String,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_created_at_with_trailing_z() {
        let envelope = TaskEnvelope {
            job_id: Uuid::now_v7(),
            kind: JobKind::Model,
            params: json!({"box": {"w": 1, "h": 1, "d": 1}}),
            submitted_by: "user-1".into(),
            attempt: 1,
            created_at: Utc::now(),
        };
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_json_bytes().unwrap()).unwrap();
        assert!(value["created_at"].as_str().unwrap().ends_with('Z'));
    }
}
