//! Cutout API Library
//!
//! HTTP front of the background-removal service: request deduplication,
//! the `POST /remove-background` handler, error rendering and server setup.

mod api_doc;
pub mod coordinator;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use api_doc::ApiDoc;
pub use coordinator::{InFlightGuard, InFlightRegistry};
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
