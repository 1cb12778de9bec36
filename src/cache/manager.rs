//! VRAM-budgeted cache of loaded model instances.
//!
//! The manager owns the loaded-models table and is the only component that
//! inserts into or evicts from it. Usage is always re-read from the device;
//! nothing here keeps a running ledger of bytes.
//!
//! Admission control is deliberately coarse: when the headroom a caller asks
//! for is not available, the whole table is flushed before loading. There is
//! no per-model LRU.
//!
//! Not `Sync`-shared: exactly one worker owns a manager and lends it to each
//! processing call by `&mut`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::model::{Capability, Model};
use crate::gpu::{SharedDevice, MB};
use crate::metrics::Metrics;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to load model {model}: {reason:#}")]
    ModelLoad { model: String, reason: anyhow::Error },

    #[error("Model {model} is not a {expected}")]
    TypeMismatch {
        model: String,
        expected: &'static str,
    },

    #[error("Model {0} is not resident")]
    NotResident(String),
}

/// Counters describing cache behaviour since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    /// Loader invocations that succeeded.
    pub loads: u64,
    /// Acquisitions served from the table.
    pub hits: u64,
    /// Full-table flushes.
    pub evictions: u64,
    /// Single-model unloads.
    pub unloads: u64,
}

/// The GPU resource manager.
pub struct ResourceManager {
    /// Budget ceiling in MB.
    max_vram_mb: u64,

    device: SharedDevice,

    /// Model name → resident instance.
    loaded: HashMap<String, Box<dyn Model>>,

    stats: ResourceStats,

    metrics: Option<Arc<Metrics>>,
}

impl ResourceManager {
    pub fn new(device: SharedDevice, max_vram_mb: u64) -> Self {
        match device.device_name() {
            Some(name) => info!(device = name, max_vram_mb, "Resource manager initialized"),
            None => warn!("No accelerator available, resource manager running on CPU"),
        }

        Self {
            max_vram_mb,
            device,
            loaded: HashMap::new(),
            stats: ResourceStats::default(),
            metrics: None,
        }
    }

    /// Report loads, evictions and residency to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn max_budget(&self) -> u64 {
        self.max_vram_mb
    }

    /// MB currently allocated on the device; 0 without an accelerator.
    pub fn current_usage(&self) -> u64 {
        if !self.device.is_available() {
            return 0;
        }
        self.device.allocated_memory() / MB
    }

    /// `max_budget - current_usage`, negative when the device is over budget.
    pub fn available_budget(&self) -> i64 {
        self.max_vram_mb as i64 - self.current_usage() as i64
    }

    /// Drop every resident model and hand freed memory back to the device.
    pub fn evict_all(&mut self) {
        let count = self.loaded.len();
        self.loaded.clear();
        self.clear_device_cache();
        self.stats.evictions += 1;

        if let Some(metrics) = &self.metrics {
            metrics.evictions.inc();
            metrics.loaded_models.set(0);
            metrics.vram_used_mb.set(self.current_usage() as i64);
        }
        info!(count, "All models unloaded");
    }

    /// Drop a single model. Returns whether it was resident.
    pub fn unload(&mut self, name: &str) -> bool {
        if self.loaded.remove(name).is_none() {
            return false;
        }
        self.clear_device_cache();
        self.stats.unloads += 1;

        if let Some(metrics) = &self.metrics {
            metrics.loaded_models.set(self.loaded.len() as i64);
            metrics.vram_used_mb.set(self.current_usage() as i64);
        }
        info!(model = name, "Model unloaded");
        true
    }

    /// Force the device allocator to release cached free memory.
    ///
    /// Independent of the table: also used after a failed job to undo
    /// fragmentation left by a half-finished allocation.
    pub fn clear_device_cache(&self) -> u64 {
        if !self.device.is_available() {
            return 0;
        }
        let released = self.device.empty_cache();
        debug!(released_mb = released / MB, "GPU cache cleared");
        released
    }

    /// Make `name` resident and lend it for the duration of one call.
    ///
    /// If fewer than `required_mb` are free the entire table is evicted
    /// first. The loader only runs when `name` is not already resident; it is
    /// given read access to the manager so it can place weights on the device
    /// and call [`ResourceManager::optimize`]. The model stays resident after
    /// the borrow ends.
    pub fn acquire<F>(
        &mut self,
        name: &str,
        loader: F,
        required_mb: u64,
    ) -> Result<&mut (dyn Model + 'static), ResourceError>
    where
        F: FnOnce(&ResourceManager) -> anyhow::Result<Box<dyn Model>>,
    {
        let available = self.available_budget();
        if available < required_mb as i64 {
            info!(
                model = name,
                required_mb,
                available_mb = available,
                "Insufficient VRAM, clearing cache"
            );
            self.evict_all();
        }

        if self.loaded.contains_key(name) {
            self.stats.hits += 1;
            debug!(model = name, "Model already resident");
        } else {
            info!(model = name, "Loading model");
            let model = loader(&*self).map_err(|reason| ResourceError::ModelLoad {
                model: name.to_string(),
                reason,
            })?;
            self.loaded.insert(name.to_string(), model);
            self.stats.loads += 1;

            if let Some(metrics) = &self.metrics {
                metrics.model_loads.inc();
                metrics.loaded_models.set(self.loaded.len() as i64);
                metrics.vram_used_mb.set(self.current_usage() as i64);
            }
            info!(
                model = name,
                vram_usage_mb = self.current_usage(),
                "Model loaded"
            );
        }

        match self.loaded.get_mut(name) {
            Some(model) => Ok(model.as_mut()),
            None => Err(ResourceError::NotResident(name.to_string())),
        }
    }

    /// [`ResourceManager::acquire`] for callers that know the concrete backend type.
    pub fn acquire_as<T, F>(
        &mut self,
        name: &str,
        loader: F,
        required_mb: u64,
    ) -> Result<&mut T, ResourceError>
    where
        T: Model,
        F: FnOnce(&ResourceManager) -> anyhow::Result<Box<dyn Model>>,
    {
        self.acquire(name, loader, required_mb)?
            .downcast_mut::<T>()
            .ok_or_else(|| ResourceError::TypeMismatch {
                model: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Switch on every memory-saving capability the model exposes.
    ///
    /// Missing capabilities are skipped; a failure enabling one is logged and
    /// the rest are still attempted. No-op without an accelerator.
    pub fn optimize(&self, mut model: Box<dyn Model>) -> Box<dyn Model> {
        if !self.device.is_available() {
            return model;
        }

        for capability in Capability::ALL {
            if !model.supports(capability) {
                continue;
            }
            match model.enable(capability) {
                Ok(()) => info!(model = model.name(), %capability, "Optimization enabled"),
                Err(e) => warn!(
                    model = model.name(),
                    %capability,
                    error = %e,
                    "Could not enable optimization"
                ),
            }
        }
        model
    }

    /// Batch size hint from current headroom.
    ///
    /// More than 4000 MB free doubles `base`, more than 2000 MB keeps it,
    /// anything less drops to 1.
    pub fn optimal_batch_size(&self, base: u32) -> u32 {
        let available = self.available_budget();
        if available > 4000 {
            base * 2
        } else if available > 2000 {
            base
        } else {
            1
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Names of resident models, sorted.
    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("max_vram_mb", &self.max_vram_mb)
            .field("loaded", &self.loaded_models())
            .field("stats", &self.stats)
            .finish()
    }
}
