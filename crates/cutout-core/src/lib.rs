//! Cutout Core Library
//!
//! This crate provides the domain models, error types and configuration shared
//! by the background-removal server, its job layer and the batch client.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, EngineKind};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ClientImageRecord, DownloadHistoryEntry, JobState, OutputFormat, ProcessingJob, RequestId,
    RequestIdSource, UnsupportedFormat, UploadRequest,
};
