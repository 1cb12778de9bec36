//! Job processors.
//!
//! A processor turns a validated [`JobPayload`] into a result object. Each one
//! picks its own model name and headroom requirement and borrows the model
//! from the [`ResourceManager`] for the duration of the call.
//!
//! - [`registry`]: lazy, memoized processor construction per job type
//! - one module per job type

pub mod cloth_swap;
pub mod image_generator;
pub mod influencer;
pub mod registry;
pub mod story_video;
pub mod study_animation;
pub mod video_3d;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::cache::manager::ResourceManager;
use crate::jobs::{JobError, JobPayload};

pub use cloth_swap::ClothSwapProcessor;
pub use image_generator::ImageGenerator;
pub use influencer::InfluencerCreator;
pub use registry::{ProcessorFactory, ProcessorRegistry};
pub use story_video::StoryVideoGenerator;
pub use study_animation::StudyAnimationGenerator;
pub use video_3d::Video3dGenerator;

/// Frame rate every video processor renders at.
pub const FPS: u32 = 30;

/// One job-type backend.
pub trait Processor: Send + Sync {
    /// Run one job. `resources` is lent exclusively for the duration of the call.
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError>;
}

/// Artifact path under the configured output directory.
pub(crate) fn artifact_path(output_dir: &Path, file_name: String) -> String {
    let path: PathBuf = output_dir.join(file_name);
    path.to_string_lossy().into_owned()
}

/// Error for a payload routed to the wrong processor.
pub(crate) fn mismatched(expected: &str, payload: &JobPayload) -> JobError {
    JobError::invalid(expected, format!("received a {} payload", payload.job_type()))
}
