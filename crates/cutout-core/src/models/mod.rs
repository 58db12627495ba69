//! Data models for the application
//!
//! Server-side request and job models, plus the client-side records the batch
//! orchestrator keeps for processed images.

mod client;
mod format;
mod job;
mod upload;

pub use client::*;
pub use format::*;
pub use job::*;
pub use upload::*;
