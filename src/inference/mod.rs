//! Model backends.
//!
//! The real sampling, pose and rendering bodies live outside this crate.
//! The backends here own the device memory their weights occupy and expose
//! the memory-saving switches the resource manager probes for.
//!
//! - [`pipeline`]: diffusion pipelines (SDXL-style)
//! - [`backend`]: single-purpose backends (pose, 3D, narration)

pub mod backend;
pub mod pipeline;

pub use backend::PlaceholderBackend;
pub use pipeline::DiffusionPipeline;
