//! gpu-job-worker: a VRAM-budgeted model cache behind a sequential job worker.
//!
//! Jobs are popped one at a time from a queue, routed to a processor by job
//! type, and run against models kept resident on a single shared GPU:
//!   queue → worker → processor → resource manager → device
//!
//! Status transitions are published as they happen. A small HTTP surface
//! exposes health, device telemetry, metrics and a local job producer.

pub mod cache;
pub mod config;
pub mod gpu;
pub mod inference;
pub mod jobs;
pub mod metrics;
pub mod processors;
pub mod server;
pub mod worker;
