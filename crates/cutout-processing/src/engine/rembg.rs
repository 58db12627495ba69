//! `rembg` engine running in an external Python process.
//!
//! The worker script is compiled into the binary and never interpolated: the
//! job is sent to the child as JSON on stdin, and the child answers with a JSON
//! report on the last line of stdout.

use async_trait::async_trait;

use crate::error::JobError;
use crate::process;
use crate::traits::{BackgroundEngine, EngineReport, EngineRequest};

const WORKER_SCRIPT: &str = include_str!("rembg_worker.py");

pub struct RembgEngine {
    python: String,
}

impl RembgEngine {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl BackgroundEngine for RembgEngine {
    fn name(&self) -> &'static str {
        "rembg"
    }

    async fn run(&self, request: &EngineRequest) -> Result<EngineReport, JobError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| JobError::Protocol(e.to_string()))?;

        tracing::info!(
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            format = %request.format,
            "Starting rembg worker"
        );

        let output = process::run(&self.python, ["-c", WORKER_SCRIPT], Some(&payload))
            .await
            .map_err(|source| JobError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(engine = "rembg", "{}", line.trim());
        }

        if !output.status.success() {
            return Err(JobError::EngineFailed {
                status: output.status.code(),
                output: output.combined(),
            });
        }

        let mut report = parse_report(&output.stdout);
        report.output = output.combined();
        Ok(report)
    }
}

/// The worker's report is the last non-empty stdout line; anything else the
/// Python side printed is ignored.
fn parse_report(stdout: &str) -> EngineReport {
    stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|line| serde_json::from_str::<EngineReport>(line.trim()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_core::{OutputFormat, ProcessingJob};
    use std::path::Path;

    fn request() -> EngineRequest {
        let job = ProcessingJob::new(Path::new("/tmp/cutout-test"), OutputFormat::Jpg);
        EngineRequest::for_job(&job, 95)
    }

    #[test]
    fn test_request_serializes_structured_fields() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["format"], "jpg");
        assert_eq!(json["encoder"], "JPEG");
        assert_eq!(json["flatten"], true);
        assert_eq!(json["jpeg_quality"], 95);
    }

    #[test]
    fn test_parse_report_uses_last_line() {
        let report = parse_report("Downloading model...\n{\"width\": 500, \"height\": 400}\n\n");
        assert_eq!(report.width, Some(500));
        assert_eq!(report.height, Some(400));
        assert_eq!(parse_report("no json here"), EngineReport::default());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let engine = RembgEngine::new("cutout-no-such-python");
        let err = engine.run(&request()).await.unwrap_err();
        assert!(matches!(err, JobError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_engine_failure() {
        // `false` ignores its arguments and exits 1.
        let engine = RembgEngine::new("false");
        let err = engine.run(&request()).await.unwrap_err();
        match err {
            JobError::EngineFailed { status, .. } => assert_eq!(status, Some(1)),
            other => panic!("expected EngineFailed, got {other:?}"),
        }
    }
}
