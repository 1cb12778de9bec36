//! Queue-driven job worker.
//!
//! - [`queue`]: the blocking FIFO the loop pops from
//! - [`publisher`]: fire-and-forget status notifications
//! - [`context`]: handles shared by the loop, processors and the HTTP surface
//! - [`dispatch`]: the loop itself

pub mod context;
pub mod dispatch;
pub mod publisher;
pub mod queue;

pub use context::WorkerContext;
pub use dispatch::{JobOutcome, Worker, WorkerStats};
pub use publisher::{BroadcastPublisher, RecordingPublisher, StatusPublisher};
pub use queue::{InMemoryQueue, JobQueue, QueueError};
