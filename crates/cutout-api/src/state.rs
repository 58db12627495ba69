//! Application state
//!
//! Everything a handler needs, built once at startup and shared behind an `Arc`.

use cutout_core::Config;
use cutout_processing::{
    ArtifactStore, BackgroundEngine, JobExecutor, ProcessingPipeline, Provisioner,
};
use std::sync::Arc;

use crate::coordinator::InFlightRegistry;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<InFlightRegistry>,
    pub pipeline: ProcessingPipeline,
    pub provisioner: Arc<dyn Provisioner>,
}

impl AppState {
    /// Wire the job layer around `engine`, with a fresh registry and a store
    /// rooted at `config.scratch_dir`.
    pub fn new(
        config: Config,
        engine: Arc<dyn BackgroundEngine>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let store = Arc::new(ArtifactStore::new(config.scratch_dir.clone()));
        let executor = JobExecutor::new(engine, config.jpeg_quality);
        Self {
            registry: Arc::new(InFlightRegistry::new()),
            pipeline: ProcessingPipeline::new(store, executor),
            provisioner,
            config,
        }
    }
}
