//! Core traits for the job layer
//!
//! The server only talks to the background-removal engine and its environment
//! through these seams, so tests can swap in in-process fakes.

use async_trait::async_trait;
use cutout_core::{OutputFormat, ProcessingJob};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{JobError, ProvisionError};

/// Structured job submission handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: OutputFormat,
    /// Encoder identifier, the uppercased format name (`JPG` becomes `JPEG`).
    pub encoder: String,
    /// Composite over opaque white before encoding.
    pub flatten: bool,
    pub jpeg_quality: u8,
}

impl EngineRequest {
    pub fn for_job(job: &ProcessingJob, jpeg_quality: u8) -> Self {
        Self {
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            format: job.format,
            encoder: job.format.encoder_name().to_string(),
            flatten: job.format.requires_opaque_background(),
            jpeg_quality,
        }
    }
}

/// What an engine reports after writing its output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineReport {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Diagnostic text the engine printed while running.
    #[serde(skip)]
    pub output: String,
}

/// Background-removal engine: reads `input_path`, writes exactly one file at
/// `output_path` on success.
#[async_trait]
pub trait BackgroundEngine: Send + Sync {
    /// Short identifier used in logs and the health endpoint.
    fn name(&self) -> &'static str;

    async fn run(&self, request: &EngineRequest) -> Result<EngineReport, JobError>;
}

/// Makes sure an engine's runtime dependencies are installed.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Idempotent; safe to call before every job.
    async fn ensure_ready(&self) -> Result<(), ProvisionError>;
}
