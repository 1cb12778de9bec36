//! The sequential dispatch loop.
//!
//! One job at a time: pop, publish `processing`, resolve, validate, process,
//! publish exactly one terminal event. Nothing raised while handling a job
//! escapes [`Worker::handle_message`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::manager::ResourceManager;
use crate::jobs::{Job, JobEnvelope, JobError, JobPayload, JobStatus, JobStatusEvent};
use crate::processors::ProcessorRegistry;
use crate::worker::WorkerContext;

/// Counters kept by the loop itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    /// Polls that timed out with nothing to do.
    pub idle_polls: u64,
    /// Messages dropped because they were not a job envelope.
    pub malformed: u64,
}

/// Terminal state of one handled job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
}

pub struct Worker {
    ctx: Arc<WorkerContext>,
    registry: ProcessorRegistry,
    resources: ResourceManager,
    stats: WorkerStats,
}

impl Worker {
    /// A worker with every built-in processor registered.
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self::with_registry(ctx, ProcessorRegistry::with_defaults())
    }

    pub fn with_registry(ctx: Arc<WorkerContext>, registry: ProcessorRegistry) -> Self {
        let resources = ResourceManager::new(ctx.device.clone(), ctx.config.gpu.max_vram_mb)
            .with_metrics(ctx.metrics.clone());
        Self {
            ctx,
            registry,
            resources,
            stats: WorkerStats::default(),
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is only observed while waiting on the queue, never while
    /// a job is being processed. Every resident model is unloaded on exit.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let queue = self.ctx.queue.clone();
        let timeout = self.ctx.config.worker.poll_timeout();
        info!(
            queue = queue.name(),
            channel = self.ctx.publisher.channel(),
            poll_timeout_secs = timeout.as_secs(),
            "Worker started, waiting for jobs"
        );

        loop {
            let popped = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                popped = queue.pop(timeout) => popped,
            };

            match popped {
                Ok(Some(raw)) => {
                    self.handle_message(&raw);
                }
                Ok(None) => {
                    self.stats.idle_polls += 1;
                }
                Err(e) => {
                    error!(error = %e, "Queue pop failed");
                    // Back off for one poll period so a dead backend does not spin.
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(timeout) => {}
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Run the loop on the blocking pool and hand the worker back once it
    /// stops. Processing never occupies a runtime worker thread.
    pub fn spawn_dedicated(mut self, shutdown: CancellationToken) -> JoinHandle<Worker> {
        tokio::task::spawn_blocking(move || {
            let rt = tokio::runtime::Handle::current();
            rt.block_on(self.run(shutdown));
            self
        })
    }

    /// Handle one raw queue message. `None` when it was not a job envelope.
    pub fn handle_message(&mut self, raw: &str) -> Option<JobOutcome> {
        let envelope = match JobEnvelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Dropping undecodable queue message");
                return None;
            }
        };
        Some(self.handle_job(Job::from(envelope)))
    }

    /// Process one job and publish its lifecycle.
    pub fn handle_job(&mut self, job: Job) -> JobOutcome {
        let started = Instant::now();
        info!(job_id = job.id(), job_type = job.job_type().unwrap_or("<missing>"), "Processing job");
        self.publish(JobStatusEvent::processing(job.id()));

        match self.run_job(&job) {
            Ok(result) => {
                self.stats.completed += 1;
                info!(
                    job_id = job.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                self.publish(JobStatusEvent::completed(job.id(), result));
                JobOutcome {
                    job_id: job.id().to_string(),
                    status: JobStatus::Completed,
                }
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(job_id = job.id(), error = %e, "Job failed");
                self.publish(JobStatusEvent::failed(job.id(), e.to_string()));
                self.resources.clear_device_cache();
                JobOutcome {
                    job_id: job.id().to_string(),
                    status: JobStatus::Failed,
                }
            }
        }
    }

    fn run_job(&mut self, job: &Job) -> Result<Value, JobError> {
        let (job_type, processor) = self.registry.resolve(job.job_type(), &self.ctx)?;
        let payload = JobPayload::parse(job_type, job.data())?;

        let resources = &mut self.resources;
        match catch_unwind(AssertUnwindSafe(|| processor.process(job.id(), &payload, resources))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                // The table may hold a half-built model; start from nothing.
                self.resources.evict_all();
                Err(JobError::Inference(anyhow::anyhow!("{job_type} processor panicked: {msg}")))
            }
        }
    }

    fn publish(&self, event: JobStatusEvent) {
        debug!(job_id = %event.job_id, status = %event.status, "Publishing status");
        self.ctx.metrics.record_status(event.status);
        self.ctx.publisher.publish(&event);
    }

    fn shutdown(&mut self) {
        let resident = self.resources.loaded_count();
        if resident > 0 {
            self.resources.evict_all();
        }
        info!(
            completed = self.stats.completed,
            failed = self.stats.failed,
            unloaded = resident,
            "Worker stopped"
        );
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("registry", &self.registry)
            .field("resources", &self.resources)
            .field("stats", &self.stats)
            .finish()
    }
}
