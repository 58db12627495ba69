//! Cutout job layer
//!
//! Everything between a parsed upload and the processed bytes: preparing the
//! engine's Python environment, scratch-file management, and running the
//! background-removal engine as an isolated job.

pub mod artifact_store;
pub mod codec;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pipeline;
mod process;
pub mod provisioner;
pub mod traits;

// Re-export commonly used types
pub use artifact_store::ArtifactStore;
pub use engine::{ChromaKeyEngine, RembgEngine};
pub use error::{JobError, ProvisionError};
pub use executor::JobExecutor;
pub use pipeline::{ProcessedImage, ProcessingPipeline};
pub use provisioner::{NoopProvisioner, PythonProvisioner};
pub use traits::{BackgroundEngine, EngineReport, EngineRequest, Provisioner};
