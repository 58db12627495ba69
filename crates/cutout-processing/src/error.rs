//! Job-layer error types

use std::io;
use std::path::PathBuf;

/// Failure of a single background-removal job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to start engine process '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The engine ran but reported failure. `output` holds combined stdout/stderr.
    #[error("Engine exited with {}", exit_label(.status))]
    EngineFailed { status: Option<i32>, output: String },

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Image codec error: {0}")]
    Codec(String),

    #[error("Engine reported success but produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Artifact I/O error: {0}")]
    Artifact(#[from] io::Error),

    #[error("Engine task failed: {0}")]
    Join(String),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl JobError {
    /// Diagnostic text produced by the engine, if any.
    pub fn engine_output(&self) -> Option<&str> {
        match self {
            JobError::EngineFailed { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

impl From<image::ImageError> for JobError {
    fn from(err: image::ImageError) -> Self {
        JobError::Codec(err.to_string())
    }
}

/// Failure while checking or installing the engine's runtime dependencies.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Environment check failed: {0}")]
    CheckFailed(String),

    #[error("Package installation failed: {0}")]
    InstallFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failed_display() {
        let err = JobError::EngineFailed {
            status: Some(1),
            output: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Engine exited with status 1");
        assert_eq!(err.engine_output(), Some("boom"));

        let killed = JobError::EngineFailed {
            status: None,
            output: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }
}
