//! Engines for exercising the coordinator's concurrency behaviour.

use async_trait::async_trait;
use cutout_processing::{
    BackgroundEngine, ChromaKeyEngine, EngineReport, EngineRequest, JobError, ProvisionError,
    Provisioner,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Chroma-key engine that signals `started` and then waits for `release`
/// before doing any work.
pub struct GatedEngine {
    inner: ChromaKeyEngine,
    pub started: Notify,
    pub release: Notify,
    pub runs: AtomicUsize,
}

impl GatedEngine {
    pub fn new() -> Self {
        Self {
            inner: ChromaKeyEngine::new(48),
            started: Notify::new(),
            release: Notify::new(),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundEngine for GatedEngine {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn run(&self, request: &EngineRequest) -> Result<EngineReport, JobError> {
        self.started.notify_one();
        self.release.notified().await;
        let report = self.inner.run(request).await;
        self.runs.fetch_add(1, Ordering::SeqCst);
        report
    }
}

/// Engine that exits unsuccessfully without writing output.
pub struct FailingEngine;

#[async_trait]
impl BackgroundEngine for FailingEngine {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn run(&self, _request: &EngineRequest) -> Result<EngineReport, JobError> {
        Err(JobError::EngineFailed {
            status: Some(1),
            output: "Processing error: cannot identify image file".to_string(),
        })
    }
}

/// Provisioner whose installation always fails.
#[derive(Default)]
pub struct FailingProvisioner {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Provisioner for FailingProvisioner {
    async fn ensure_ready(&self) -> Result<(), ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProvisionError::InstallFailed(
            "ERROR: Could not find a version that satisfies the requirement rembg".to_string(),
        ))
    }
}
