//! Static job-kind → (queue, routing key) router table.
//!
//! Grounded on `examples/original_source/apps/api/app/core/job_routing.py`'s
//! `JOB_TYPE_TO_QUEUE` / `JOB_TYPE_TO_ROUTING_KEY` dicts and spec.md §6's
//! Queue family set. Unlike the Python original, kinds are a closed sum
//! type: an unknown kind is a compile error, not a runtime dictionary miss.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Every job kind the core knows how to route. New kinds require a new
/// variant and a new `RouterEntry` below — there is no dynamic registration,
/// matching spec.md §9's "sum type over job kinds... unknown kinds are
/// impossible statically."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ai,
    Model,
    Assembly,
    CadGenerate,
    CadImport,
    CadExport,
    ModelRepair,
    Cam,
    CamProcess,
    CamOptimize,
    GcodePost,
    GcodeVerify,
    Sim,
    SimRun,
    SimCollision,
    Report,
    Erp,
}

impl JobKind {
    /// Parses the wire string (as submitted in `{kind: enum, ...}`), matching
    /// the snake_case spellings used in spec.md §6 and `job_routing.py`.
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        use JobKind::*;
        Ok(match raw {
            "ai" => Ai,
            "model" => Model,
            "assembly" => Assembly,
            "cad_generate" => CadGenerate,
            "cad_import" => CadImport,
            "cad_export" => CadExport,
            "model_repair" => ModelRepair,
            "cam" => Cam,
            "cam_process" => CamProcess,
            "cam_optimize" => CamOptimize,
            "gcode_post" => GcodePost,
            "gcode_verify" => GcodeVerify,
            "sim" => Sim,
            "sim_run" => SimRun,
            "sim_collision" => SimCollision,
            "report" => Report,
            "erp" => Erp,
            other => return Err(JobError::KindUnknown(other.to_string())),
        })
    }

    pub fn as_str(&self) -> &'static str {
        use JobKind::*;
        match self {
            Ai => "ai",
            Model => "model",
            Assembly => "assembly",
            CadGenerate => "cad_generate",
            CadImport => "cad_import",
            CadExport => "cad_export",
            ModelRepair => "model_repair",
            Cam => "cam",
            CamProcess => "cam_process",
            CamOptimize => "cam_optimize",
            GcodePost => "gcode_post",
            GcodeVerify => "gcode_verify",
            Sim => "sim",
            SimRun => "sim_run",
            SimCollision => "sim_collision",
            Report => "report",
            Erp => "erp",
        }
    }

    /// Every variant, used for startup completeness checks and tests.
    pub fn all() -> &'static [JobKind] {
        use JobKind::*;
        &[
            Ai, Model, Assembly, CadGenerate, CadImport, CadExport, ModelRepair, Cam,
            CamProcess, CamOptimize, GcodePost, GcodeVerify, Sim, SimRun, SimCollision, Report,
            Erp,
        ]
    }

    pub fn route(&self) -> &'static RouterEntry {
        ROUTER_TABLE.get(self).expect("ROUTER_TABLE covers every JobKind variant")
    }
}

/// Static routing facts for one job kind.
#[derive(Debug, Clone, Copy)]
pub struct RouterEntry {
    pub queue: &'static str,
    pub routing_key: &'static str,
    pub max_retries: u32,
    pub timeout_seconds: u32,
}

const fn entry(
    queue: &'static str,
    routing_key: &'static str,
    max_retries: u32,
    timeout_seconds: u32,
) -> RouterEntry {
    RouterEntry {
        queue,
        routing_key,
        max_retries,
        timeout_seconds,
    }
}

static ROUTER_TABLE: LazyLock<HashMap<JobKind, RouterEntry>> = LazyLock::new(|| {
    use JobKind::*;
    HashMap::from([
        (Ai, entry("default", "jobs.ai", 3, 300)),
        (Model, entry("model", "jobs.model", 3, 600)),
        (Assembly, entry("model", "jobs.model", 3, 600)),
        (CadGenerate, entry("model", "jobs.model", 3, 600)),
        (CadImport, entry("model", "jobs.model", 3, 600)),
        (CadExport, entry("model", "jobs.model", 3, 600)),
        (ModelRepair, entry("model", "jobs.model", 3, 600)),
        (Cam, entry("cam", "jobs.cam", 3, 900)),
        (CamProcess, entry("cam", "jobs.cam", 3, 900)),
        (CamOptimize, entry("cam", "jobs.cam", 3, 900)),
        (GcodePost, entry("cam", "jobs.cam", 3, 900)),
        (GcodeVerify, entry("cam", "jobs.cam", 3, 900)),
        (Sim, entry("sim", "jobs.sim", 2, 1800)),
        (SimRun, entry("sim", "jobs.sim", 2, 1800)),
        (SimCollision, entry("sim", "jobs.sim", 2, 1800)),
        (Report, entry("report", "jobs.report", 3, 300)),
        (Erp, entry("erp", "jobs.erp", 3, 300)),
    ])
});

/// Reverse index: queue name → job kinds routed there. Precomputed at
/// startup (spec.md §4.7, "using the Router Table's reverse index") so the
/// Queue Position Service never recomputes it per request.
pub static QUEUE_REVERSE_INDEX: LazyLock<HashMap<&'static str, Vec<JobKind>>> =
    LazyLock::new(|| {
        let mut index: HashMap<&'static str, Vec<JobKind>> = HashMap::new();
        for kind in JobKind::all() {
            index.entry(kind.route().queue).or_default().push(*kind);
        }
        index
    });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_router_entry() {
        for kind in JobKind::all() {
            let _ = kind.route();
        }
    }

    #[test]
    fn routing_key_follows_family_convention() {
        for kind in JobKind::all() {
            assert!(kind.route().routing_key.starts_with("jobs."));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(JobKind::parse("teleport"), Err(JobError::KindUnknown(_))));
    }

    #[test]
    fn legacy_aliases_share_the_family_queue() {
        assert_eq!(JobKind::CadGenerate.route().queue, JobKind::Model.route().queue);
        assert_eq!(JobKind::GcodePost.route().queue, JobKind::Cam.route().queue);
        assert_eq!(JobKind::SimRun.route().queue, JobKind::Sim.route().queue);
    }

    #[test]
    fn reverse_index_covers_every_queue() {
        assert!(QUEUE_REVERSE_INDEX.contains_key("model"));
        assert!(QUEUE_REVERSE_INDEX["model"].len() >= 5);
    }

    #[test]
    fn round_trip_parse_and_render() {
        for kind in JobKind::all() {
            assert_eq!(JobKind::parse(kind.as_str()).unwrap(), *kind);
        }
    }
}
