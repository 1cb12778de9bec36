//! Rendered 3D scene with a scripted camera move.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::PlaceholderBackend;
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor, FPS};
use crate::worker::WorkerContext;

pub struct Video3dGenerator {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl Video3dGenerator {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::Video3d).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }
}

impl Processor for Video3dGenerator {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::Video3d(req) = payload else {
            return Err(mismatched(JobType::Video3d.as_str(), payload));
        };

        info!(
            job_id,
            duration = req.duration,
            camera = req.camera_movement,
            "Generating 3D video"
        );

        let renderer = resources.acquire_as::<PlaceholderBackend, _>(
            &self.spec.name,
            PlaceholderBackend::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        // Scene generation, camera path, frame render.
        renderer.invoke();
        renderer.invoke();
        let frames = req.duration * FPS;
        renderer.invoke();

        Ok(json!({
            "video_path": artifact_path(&self.output_dir, format!("3d_video_{job_id}.mp4")),
            "duration": req.duration,
            "fps": FPS,
            "frames": frames,
            "cameraMovement": req.camera_movement,
            "style": req.style,
        }))
    }
}
