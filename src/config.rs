//! Runtime configuration for gpu-job-worker.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Budgets, queue names, model catalog and the HTTP surface all live here.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::jobs::JobType;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "gpu-job-worker", about = "VRAM-budgeted GPU job worker")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Compute device backend (overrides `gpu.device`).
    #[arg(long, value_enum)]
    pub device: Option<DeviceKind>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device and VRAM budget.
    pub gpu: GpuConfig,

    /// Queue / status channel settings.
    pub worker: WorkerConfig,

    /// Health and stats HTTP surface.
    pub server: ServerConfig,

    /// Model catalog, one entry per job type.
    pub models: ModelCatalog,

    /// Directory processors build their artifact paths under.
    pub output_dir: OutputDir,
}

/// Which device backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CUDA when compiled in and present, CPU otherwise.
    Auto,
    Cpu,
    Simulated,
    Cuda,
}

/// GPU settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// VRAM ceiling in MB the resource manager budgets against.
    pub max_vram_mb: u64,

    /// Device backend.
    pub device: DeviceKind,

    /// CUDA ordinal.
    pub device_index: usize,

    /// Total memory of the simulated device in MB.
    pub simulated_total_mb: u64,

    /// Name the simulated device reports.
    pub simulated_name: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            max_vram_mb: 7500,
            device: DeviceKind::Auto,
            device_index: 0,
            simulated_total_mb: 8192, // RTX 3050, 8 GB
            simulated_name: "Simulated GeForce RTX 3050".to_string(),
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the list the worker pops job envelopes from.
    pub queue_name: String,

    /// Bounded wait of each dequeue, in seconds. Values below 1 are raised to 1.
    pub poll_timeout_secs: u64,

    /// Topic status events are published on.
    pub status_channel: String,

    /// Capacity of the status broadcast buffer.
    pub event_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "bull:job-queue:wait".to_string(),
            poll_timeout_secs: 5,
            status_channel: "job-updates".to_string(),
            event_buffer: 256,
        }
    }
}

impl WorkerConfig {
    pub fn poll_timeout(&self) -> std::time::Duration {
        // A zero wait would turn the dequeue loop into a spin.
        std::time::Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve `/health`, `/gpu/stats`, `/metrics` and the job endpoints.
    pub enabled: bool,

    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Model used by one job type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Key in the loaded-models table.
    pub name: String,

    /// Upstream weights identifier.
    pub model_id: String,

    /// Headroom in MB demanded before the model is used.
    pub required_vram_mb: u64,

    /// Memory in MB the loaded weights occupy on the device.
    pub footprint_mb: u64,
}

impl ModelSpec {
    fn new(name: &str, model_id: &str, required_vram_mb: u64, footprint_mb: u64) -> Self {
        Self {
            name: name.to_string(),
            model_id: model_id.to_string(),
            required_vram_mb,
            footprint_mb,
        }
    }
}

/// Per job-type model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ModelCatalog {
    pub image_generation: ModelSpec,
    pub cloth_swap: ModelSpec,
    pub influencer_creation: ModelSpec,
    #[serde(rename = "3d-video")]
    pub video_3d: ModelSpec,
    pub study_animation: ModelSpec,
    pub story_video: ModelSpec,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            image_generation: ModelSpec::new(
                "sdxl",
                "stabilityai/stable-diffusion-xl-base-1.0",
                4000,
                3500,
            ),
            cloth_swap: ModelSpec::new("cloth-swap", "cloth_swap_v1", 3000, 2500),
            influencer_creation: ModelSpec::new(
                "influencer",
                "stabilityai/stable-diffusion-xl-base-1.0",
                4000,
                3500,
            ),
            video_3d: ModelSpec::new("3d-video", "3d_video_v1", 4000, 3000),
            study_animation: ModelSpec::new("study-anim", "study_animation_v1", 3500, 3000),
            story_video: ModelSpec::new("story-video", "story_video_v1", 5000, 4500),
        }
    }
}

impl ModelCatalog {
    /// Model entry for a job type.
    pub fn for_job(&self, job_type: JobType) -> &ModelSpec {
        match job_type {
            JobType::ImageGeneration => &self.image_generation,
            JobType::ClothSwap => &self.cloth_swap,
            JobType::InfluencerCreation => &self.influencer_creation,
            JobType::Video3d => &self.video_3d,
            JobType::StudyAnimation => &self.study_animation,
            JobType::StoryVideo => &self.story_video,
        }
    }
}

/// Output directory wrapper so it can default independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputDir(pub PathBuf);

impl Default for OutputDir {
    fn default() -> Self {
        Self(PathBuf::from("/tmp"))
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(device) = cli.device {
            self.gpu.device = device;
        }
    }
}
