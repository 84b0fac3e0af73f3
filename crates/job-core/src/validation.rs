//! Per-kind payload validation (spec.md §4.1).
//!
//! Grounded on `examples/original_source/apps/api/app/core/job_validator.py`:
//! that file validates with a Pydantic model per job type and converts
//! failures to `ERR-JOB-400`/`ERR-JOB-422`. This is the same shape made
//! static — a registry of per-kind check functions keyed by the closed
//! `JobKind` sum type, so there is no runtime "unregistered validator"
//! failure mode.

use serde_json::Value;

use crate::canon::canonical_byte_len;
use crate::error::JobError;
use crate::router::JobKind;

/// Hard cap on canonical-serialized payload size (spec.md §4.1/§6).
pub const MAX_PAYLOAD_BYTES: usize = 262_144;

/// The full submission envelope (spec.md §6), prior to Job construction.
pub struct SubmissionEnvelope<'a> {
    pub kind: JobKind,
    pub params: &'a Value,
    pub chain_cam: bool,
    pub chain_sim: bool,
}

/// Runs the size cap, the per-kind structural checks, and the cross-field
/// rules, in that order — cheapest rejection first.
pub fn validate(envelope: &SubmissionEnvelope<'_>) -> Result<(), JobError> {
    let size = canonical_byte_len(envelope.params);
    if size > MAX_PAYLOAD_BYTES {
        return Err(JobError::PayloadTooLarge {
            size,
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    validate_kind_fields(envelope.kind, envelope.params)?;
    validate_cross_field(envelope)?;
    Ok(())
}

fn require_object(params: &Value) -> Result<&serde_json::Map<String, Value>, JobError> {
    params
        .as_object()
        .ok_or_else(|| JobError::FieldType {
            field: "params".into(),
            expected: "object".into(),
        })
}

fn require_field<'a>(obj: &'a serde_json::Map<String, Value>, field: &str) -> Result<&'a Value, JobError> {
    obj.get(field)
        .ok_or_else(|| JobError::FieldMissing(field.to_string()))
}

fn require_str<'a>(obj: &'a serde_json::Map<String, Value>, field: &str) -> Result<&'a str, JobError> {
    require_field(obj, field)?.as_str().ok_or_else(|| JobError::FieldType {
        field: field.to_string(),
        expected: "string".into(),
    })
}

fn require_positive_number(obj: &serde_json::Map<String, Value>, field: &str) -> Result<f64, JobError> {
    let n = require_field(obj, field)?.as_f64().ok_or_else(|| JobError::FieldType {
        field: field.to_string(),
        expected: "number".into(),
    })?;
    if n <= 0.0 {
        return Err(JobError::Range {
            field: field.to_string(),
            reason: format!("{n} must be > 0"),
        });
    }
    Ok(n)
}

/// Per-kind structural validation. Each arm is the registry entry for that
/// kind (spec.md §4.1: "the validator holds a registry keyed by `kind`").
fn validate_kind_fields(kind: JobKind, params: &Value) -> Result<(), JobError> {
    let obj = require_object(params)?;
    match kind {
        JobKind::Ai => validate_ai_prompt(obj),
        JobKind::Model | JobKind::CadGenerate | JobKind::CadImport | JobKind::ModelRepair => {
            validate_model_box(obj)
        }
        JobKind::Assembly => validate_assembly(obj),
        JobKind::CadExport => {
            require_str(obj, "format")?;
            Ok(())
        }
        JobKind::Cam | JobKind::CamProcess | JobKind::CamOptimize | JobKind::GcodePost | JobKind::GcodeVerify => {
            validate_cam(obj)
        }
        JobKind::Sim | JobKind::SimRun | JobKind::SimCollision => Ok(()),
        JobKind::Report => {
            require_str(obj, "report_type")?;
            Ok(())
        }
        JobKind::Erp => {
            require_str(obj, "document_type")?;
            Ok(())
        }
    }
}

/// Prompt payloads require at least 10 characters and 3 whitespace-separated
/// tokens (spec.md §8 boundary behavior).
fn validate_ai_prompt(obj: &serde_json::Map<String, Value>) -> Result<(), JobError> {
    let prompt = require_str(obj, "prompt")?;
    if prompt.chars().count() < 10 {
        return Err(JobError::Range {
            field: "prompt".into(),
            reason: "must be at least 10 characters".into(),
        });
    }
    let token_count = prompt.split_whitespace().count();
    if token_count < 3 {
        return Err(JobError::Range {
            field: "prompt".into(),
            reason: format!("must contain at least 3 whitespace-separated tokens, found {token_count}"),
        });
    }
    Ok(())
}

fn validate_model_box(obj: &serde_json::Map<String, Value>) -> Result<(), JobError> {
    let box_value = require_field(obj, "box")?;
    let box_obj = box_value.as_object().ok_or_else(|| JobError::FieldType {
        field: "box".into(),
        expected: "object".into(),
    })?;
    require_positive_number(box_obj, "w")?;
    require_positive_number(box_obj, "h")?;
    require_positive_number(box_obj, "d")?;
    Ok(())
}

/// Assembly part-reference integrity: every constraint's `part1`/`part2`
/// must name a declared part (spec.md §4.1).
fn validate_assembly(obj: &serde_json::Map<String, Value>) -> Result<(), JobError> {
    let parts = require_field(obj, "parts")?
        .as_array()
        .ok_or_else(|| JobError::FieldType {
            field: "parts".into(),
            expected: "array".into(),
        })?;
    let part_ids: std::collections::HashSet<&str> = parts
        .iter()
        .filter_map(|p| p.get("id").and_then(Value::as_str))
        .collect();
    if part_ids.len() != parts.len() {
        return Err(JobError::CrossField("every part must declare a unique string id".into()));
    }

    let constraints = obj.get("constraints").and_then(Value::as_array).cloned().unwrap_or_default();
    for constraint in &constraints {
        for side in ["part1", "part2"] {
            let referenced = constraint.get(side).and_then(Value::as_str).ok_or_else(|| {
                JobError::FieldMissing(format!("constraints[].{side}"))
            })?;
            if !part_ids.contains(referenced) {
                return Err(JobError::CrossField(format!(
                    "constraint references undeclared part '{referenced}'"
                )));
            }
        }
    }
    Ok(())
}

const CAM_PROCESSES: &[&str] = &["milling", "turning", "drilling"];

/// Material-process compatibility (spec.md §4.1). Wax stock cannot survive
/// turning's chucking forces; this is the one cross-field rule the core
/// enforces rather than delegating to the CAM worker.
const INCOMPATIBLE_MATERIAL_PROCESS: &[(&str, &str)] = &[("wax", "turning")];

fn validate_cam(obj: &serde_json::Map<String, Value>) -> Result<(), JobError> {
    let process = require_str(obj, "process")?;
    if !CAM_PROCESSES.contains(&process) {
        return Err(JobError::Range {
            field: "process".into(),
            reason: format!("must be one of {CAM_PROCESSES:?}"),
        });
    }
    let material = require_str(obj, "material")?;
    if INCOMPATIBLE_MATERIAL_PROCESS
        .iter()
        .any(|(m, p)| *m == material && *p == process)
    {
        return Err(JobError::CrossField(format!(
            "material '{material}' is not compatible with process '{process}'"
        )));
    }
    Ok(())
}

/// Chained-job preconditions: simulation chaining requires CAM chaining
/// (spec.md §4.1/§9).
fn validate_cross_field(envelope: &SubmissionEnvelope<'_>) -> Result<(), JobError> {
    if envelope.chain_sim && !envelope.chain_cam {
        return Err(JobError::CrossField(
            "chain_sim requires chain_cam to also be set".into(),
        ));
    }
    Ok(())
}
