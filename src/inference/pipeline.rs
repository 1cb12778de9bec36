//! Diffusion pipeline stand-in.

use std::any::Any;

use serde_json::{json, Value};
use tracing::debug;

use crate::cache::manager::ResourceManager;
use crate::cache::model::Model;
use crate::config::ModelSpec;
use crate::gpu::{DeviceAllocation, MB};

/// Parameters of one sampling call.
#[derive(Debug, Clone)]
pub struct SampleParams<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
}

/// A loaded text-to-image pipeline.
#[derive(Debug)]
pub struct DiffusionPipeline {
    name: String,
    model_id: String,
    weights: DeviceAllocation,
    memory_efficient_attention: bool,
    attention_slice: Option<u32>,
    vae_slicing: bool,
    samples: u64,
}

impl DiffusionPipeline {
    /// Place the pipeline weights on the manager's device.
    pub fn load(spec: &ModelSpec, rm: &ResourceManager) -> anyhow::Result<Self> {
        let weights = rm.device().allocate(spec.footprint_mb * MB)?;
        debug!(model = spec.name, model_id = spec.model_id, "Diffusion weights placed");
        Ok(Self {
            name: spec.name.clone(),
            model_id: spec.model_id.clone(),
            weights,
            memory_efficient_attention: false,
            attention_slice: None,
            vae_slicing: false,
            samples: 0,
        })
    }

    /// Loader suitable for [`ResourceManager::acquire`]: loads, then optimizes.
    pub fn loader(spec: &ModelSpec) -> impl FnOnce(&ResourceManager) -> anyhow::Result<Box<dyn Model>> + '_ {
        move |rm: &ResourceManager| {
            let pipeline: Box<dyn Model> = Box::new(Self::load(spec, rm)?);
            Ok(rm.optimize(pipeline))
        }
    }

    /// Produce one image description. The sampler itself is external.
    pub fn sample(&mut self, params: &SampleParams<'_>) -> Value {
        self.samples += 1;
        json!({
            "model": self.model_id,
            "prompt": params.prompt,
            "negativePrompt": params.negative_prompt,
            "width": params.width,
            "height": params.height,
            "steps": params.steps,
            "guidanceScale": params.guidance_scale,
        })
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn weights_bytes(&self) -> u64 {
        self.weights.bytes()
    }

    pub fn memory_efficient_attention(&self) -> bool {
        self.memory_efficient_attention
    }

    pub fn attention_slice(&self) -> Option<u32> {
        self.attention_slice
    }

    pub fn vae_slicing(&self) -> bool {
        self.vae_slicing
    }
}

impl Model for DiffusionPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_memory_efficient_attention(&self) -> bool {
        true
    }

    fn enable_memory_efficient_attention(&mut self) -> anyhow::Result<()> {
        self.memory_efficient_attention = true;
        Ok(())
    }

    fn supports_attention_slicing(&self) -> bool {
        true
    }

    fn enable_attention_slicing(&mut self, slice_size: u32) -> anyhow::Result<()> {
        self.attention_slice = Some(slice_size);
        Ok(())
    }

    fn supports_vae_slicing(&self) -> bool {
        true
    }

    fn enable_vae_slicing(&mut self) -> anyhow::Result<()> {
        self.vae_slicing = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
