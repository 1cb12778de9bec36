//! Virtual try-on: dress the person image in the cloth image.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::PlaceholderBackend;
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor};
use crate::worker::WorkerContext;

pub struct ClothSwapProcessor {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl ClothSwapProcessor {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::ClothSwap).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }
}

impl Processor for ClothSwapProcessor {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::ClothSwap(req) = payload else {
            return Err(mismatched(JobType::ClothSwap.as_str(), payload));
        };

        info!(job_id, category = req.category, "Processing cloth swap");

        let backend = resources.acquire_as::<PlaceholderBackend, _>(
            &self.spec.name,
            PlaceholderBackend::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        // Pose detection, cloth segmentation, then the warp.
        for _ in 0..3 {
            backend.invoke();
        }

        Ok(json!({
            "output": artifact_path(&self.output_dir, format!("cloth_swap_{job_id}.png")),
            "category": req.category,
            "preserveFace": req.preserve_face,
            "inputs": [req.person_url, req.cloth_url],
        }))
    }
}
