//! Jobs as the worker sees them.
//!
//! - [`types`]: envelopes, job types, statuses and status events
//! - [`payload`]: typed, validated payloads
//! - [`error`]: per-job failure taxonomy

pub mod error;
pub mod payload;
pub mod types;

pub use error::JobError;
pub use payload::JobPayload;
pub use types::{Job, JobEnvelope, JobStatus, JobStatusEvent, JobType};
