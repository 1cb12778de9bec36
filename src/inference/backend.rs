//! Backends without tunable memory switches.

use std::any::Any;

use tracing::debug;

use crate::cache::manager::ResourceManager;
use crate::cache::model::Model;
use crate::config::ModelSpec;
use crate::gpu::{DeviceAllocation, MB};

/// Weights for pose detection, 3D rendering, narration and the like.
#[derive(Debug)]
pub struct PlaceholderBackend {
    name: String,
    model_id: String,
    weights: DeviceAllocation,
    invocations: u64,
}

impl PlaceholderBackend {
    pub fn load(spec: &ModelSpec, rm: &ResourceManager) -> anyhow::Result<Self> {
        let weights = rm.device().allocate(spec.footprint_mb * MB)?;
        debug!(model = spec.name, model_id = spec.model_id, "Backend weights placed");
        Ok(Self {
            name: spec.name.clone(),
            model_id: spec.model_id.clone(),
            weights,
            invocations: 0,
        })
    }

    pub fn loader(spec: &ModelSpec) -> impl FnOnce(&ResourceManager) -> anyhow::Result<Box<dyn Model>> + '_ {
        move |rm: &ResourceManager| {
            let backend: Box<dyn Model> = Box::new(Self::load(spec, rm)?);
            Ok(backend)
        }
    }

    /// Record one forward pass.
    pub fn invoke(&mut self) -> u64 {
        self.invocations += 1;
        self.invocations
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn weights_bytes(&self) -> u64 {
        self.weights.bytes()
    }
}

impl Model for PlaceholderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
