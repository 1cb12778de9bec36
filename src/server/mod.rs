//! HTTP surface next to the worker.
//!
//! - [`api`]: route handlers for health, device stats, metrics and job submission
//! - [`streaming`]: SSE stream of job status events

pub mod api;
pub mod streaming;

pub use api::{build_router, AppState};
