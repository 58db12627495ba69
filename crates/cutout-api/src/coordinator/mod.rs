//! Request coordination state shared by all handlers.

mod registry;

pub use registry::{InFlightGuard, InFlightRegistry};
