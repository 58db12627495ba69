//! Runs one background-removal job through the configured engine.

use cutout_core::{JobState, ProcessingJob};
use std::sync::Arc;
use std::time::Instant;

use crate::error::JobError;
use crate::traits::{BackgroundEngine, EngineReport, EngineRequest};

/// Invokes the engine exactly once per job. There is no retry at this layer;
/// callers decide what a failure means.
#[derive(Clone)]
pub struct JobExecutor {
    engine: Arc<dyn BackgroundEngine>,
    jpeg_quality: u8,
}

impl JobExecutor {
    pub fn new(engine: Arc<dyn BackgroundEngine>, jpeg_quality: u8) -> Self {
        Self {
            engine,
            jpeg_quality,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Run the engine for `job`, advancing its state to `Succeeded` or `Failed`.
    ///
    /// Success requires both a clean engine exit and a file at `output_path`.
    pub async fn invoke(&self, job: &mut ProcessingJob) -> Result<EngineReport, JobError> {
        job.state = JobState::Running;
        let request = EngineRequest::for_job(job, self.jpeg_quality);
        let started = Instant::now();

        let result = match self.engine.run(&request).await {
            Ok(report) => match tokio::fs::try_exists(&job.output_path).await {
                Ok(true) => Ok(report),
                Ok(false) => Err(JobError::MissingOutput(job.output_path.clone())),
                Err(e) => Err(JobError::Artifact(e)),
            },
            Err(e) => Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => {
                job.state = JobState::Succeeded;
                tracing::info!(
                    job_id = %job.job_id,
                    engine = self.engine.name(),
                    format = %job.format,
                    width = ?report.width,
                    height = ?report.height,
                    elapsed_ms,
                    "Background removal completed"
                );
            }
            Err(e) => {
                job.state = JobState::Failed;
                tracing::error!(
                    job_id = %job.job_id,
                    engine = self.engine.name(),
                    error = %e,
                    engine_output = e.engine_output().unwrap_or(""),
                    elapsed_ms,
                    "Background removal failed"
                );
            }
        }

        result
    }
}
