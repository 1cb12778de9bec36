//! Prometheus metrics for the worker and the model cache.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::jobs::JobStatus;

/// All metrics, registered on a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub jobs: IntCounterVec,
    pub evictions: IntCounter,
    pub model_loads: IntCounter,
    pub loaded_models: IntGauge,
    pub vram_used_mb: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let jobs = IntCounterVec::new(
            Opts::new("gpu_worker_jobs_total", "Job status transitions published"),
            &["status"],
        )?;
        let evictions = IntCounter::new(
            "gpu_worker_evictions_total",
            "Full flushes of the loaded-models table",
        )?;
        let model_loads = IntCounter::new("gpu_worker_model_loads_total", "Successful model loads")?;
        let loaded_models = IntGauge::new("gpu_worker_loaded_models", "Models currently resident")?;
        let vram_used_mb = IntGauge::new("gpu_worker_vram_used_mb", "Device memory allocated, in MB")?;

        registry.register(Box::new(jobs.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(model_loads.clone()))?;
        registry.register(Box::new(loaded_models.clone()))?;
        registry.register(Box::new(vram_used_mb.clone()))?;

        Ok(Self {
            registry,
            jobs,
            evictions,
            model_loads,
            loaded_models,
            vram_used_mb,
        })
    }

    pub fn record_status(&self, status: JobStatus) {
        self.jobs.with_label_values(&[status.as_str()]).inc();
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> u64 {
        self.jobs.with_label_values(&[status.as_str()]).get()
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("evictions", &self.evictions.get())
            .field("model_loads", &self.model_loads.get())
            .field("loaded_models", &self.loaded_models.get())
            .finish()
    }
}
