//! Engine and provisioner selection.

use anyhow::Result;
use cutout_core::{Config, EngineKind};
use cutout_processing::{
    BackgroundEngine, ChromaKeyEngine, NoopProvisioner, PythonProvisioner, Provisioner,
    RembgEngine,
};
use std::sync::Arc;

use crate::state::AppState;

/// Build the engine named by `config.engine` and the provisioner it needs.
pub fn build_engine(config: &Config) -> (Arc<dyn BackgroundEngine>, Arc<dyn Provisioner>) {
    match config.engine {
        EngineKind::Rembg => (
            Arc::new(RembgEngine::new(config.python_path.clone())),
            Arc::new(PythonProvisioner::new(
                config.python_path.clone(),
                config.requirements_path.clone(),
                config.onnxruntime_default_version.clone(),
            )),
        ),
        EngineKind::ChromaKey => (
            Arc::new(ChromaKeyEngine::new(config.chroma_key_tolerance)),
            Arc::new(NoopProvisioner),
        ),
    }
}

pub fn initialize_services(config: &Config) -> Result<Arc<AppState>> {
    let (engine, provisioner) = build_engine(config);
    tracing::info!(
        engine = engine.name(),
        scratch_dir = %config.scratch_dir.display(),
        "Background removal engine configured"
    );
    Ok(Arc::new(AppState::new(config.clone(), engine, provisioner)))
}
