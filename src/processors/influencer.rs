//! Consistent-face persona generation across several poses.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::pipeline::{DiffusionPipeline, SampleParams};
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor};
use crate::worker::WorkerContext;

const POSES: [&str; 10] = [
    "front facing portrait",
    "side profile view",
    "three quarter view",
    "smiling expression",
    "professional headshot",
    "casual outdoor setting",
    "studio lighting",
    "natural lighting",
    "fashion pose",
    "lifestyle photo",
];

pub struct InfluencerCreator {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl InfluencerCreator {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::InfluencerCreation).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }

    fn base_prompt(gender: &str, ethnicity: &str, age_range: &str) -> String {
        format!(
            "professional portrait photo of a {age_range} year old {ethnicity} {gender}, \
             perfect face, symmetrical features, high quality, 8k, detailed, photorealistic"
        )
    }
}

impl Processor for InfluencerCreator {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::InfluencerCreation(req) = payload else {
            return Err(mismatched(JobType::InfluencerCreation.as_str(), payload));
        };

        info!(job_id, poses = req.poses, style = req.style, "Creating influencer");
        let base = Self::base_prompt(&req.gender, &req.ethnicity, &req.age_range);

        let pipe = resources.acquire_as::<DiffusionPipeline, _>(
            &self.spec.name,
            DiffusionPipeline::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        let mut images = Vec::new();
        for (i, pose) in POSES.iter().take(req.poses as usize).enumerate() {
            let prompt = format!("{base}, {pose}, {} style", req.style);
            pipe.sample(&SampleParams {
                prompt: &prompt,
                negative_prompt: "",
                width: 1024,
                height: 1024,
                steps: 30,
                guidance_scale: 7.5,
            });
            images.push(artifact_path(&self.output_dir, format!("influencer_{job_id}_{i}.png")));
        }

        Ok(json!({
            "images": images,
            "count": images.len(),
            "persona": {
                "gender": req.gender,
                "ethnicity": req.ethnicity,
                "ageRange": req.age_range,
                "style": req.style,
            },
        }))
    }
}
