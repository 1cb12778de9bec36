//! Text-to-image generation on an SDXL-style pipeline.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::pipeline::{DiffusionPipeline, SampleParams};
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor};
use crate::worker::WorkerContext;

const GUIDANCE_SCALE: f32 = 7.5;

pub struct ImageGenerator {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl ImageGenerator {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::ImageGeneration).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }
}

impl Processor for ImageGenerator {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::ImageGeneration(req) = payload else {
            return Err(mismatched(JobType::ImageGeneration.as_str(), payload));
        };

        let batch_size = resources.optimal_batch_size(1);
        info!(
            job_id,
            num_images = req.num_images,
            batch_size,
            prompt = %req.prompt.chars().take(50).collect::<String>(),
            "Generating images"
        );

        let pipe = resources.acquire_as::<DiffusionPipeline, _>(
            &self.spec.name,
            DiffusionPipeline::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        let params = SampleParams {
            prompt: &req.prompt,
            negative_prompt: &req.negative_prompt,
            width: req.width,
            height: req.height,
            steps: req.steps,
            guidance_scale: GUIDANCE_SCALE,
        };

        let mut images = Vec::with_capacity(req.num_images as usize);
        for i in 0..req.num_images {
            pipe.sample(&params);
            images.push(artifact_path(&self.output_dir, format!("output_{job_id}_{i}.png")));
            info!(job_id, "Generated image {}/{}", i + 1, req.num_images);
        }

        Ok(json!({
            "images": images,
            "count": images.len(),
            "batchSize": batch_size,
        }))
    }
}
