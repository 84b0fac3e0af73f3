pub mod artefact;
pub mod job;
pub mod license;

pub use artefact::{Artefact, ArtefactType};
pub use job::{Job, JobState, LastError, Progress, WorkerOutcome};
pub use license::{License, LicenseStatus};
