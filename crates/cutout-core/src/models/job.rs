use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::OutputFormat;

/// Lifecycle of a single engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One background-removal job and the scratch files it owns.
///
/// Both paths live in the shared scratch directory and embed `job_id`, so
/// concurrent jobs never touch each other's files.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: OutputFormat,
    pub state: JobState,
}

impl ProcessingJob {
    /// Allocate a job with fresh `input_<uuid>` / `output_<uuid>.<ext>` paths under `dir`.
    pub fn new(dir: &Path, format: OutputFormat) -> Self {
        let job_id = Uuid::new_v4();
        Self {
            job_id,
            input_path: dir.join(format!("input_{}", job_id)),
            output_path: dir.join(format!("output_{}.{}", job_id, format.extension())),
            format,
            state: JobState::Pending,
        }
    }

    /// Both artifact paths, in cleanup order.
    pub fn artifact_paths(&self) -> [&Path; 2] {
        [self.input_path.as_path(), self.output_path.as_path()]
    }
}
