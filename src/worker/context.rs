//! Shared handles built once at startup.

use std::sync::Arc;

use crate::config::Config;
use crate::gpu::{open_device, SharedDevice};
use crate::metrics::Metrics;
use crate::worker::publisher::{BroadcastPublisher, StatusPublisher};
use crate::worker::queue::{InMemoryQueue, JobQueue};

/// Everything processors, the dispatch loop and the HTTP surface share.
///
/// The resource manager is deliberately absent: the worker owns it and lends
/// it to one processor at a time.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub device: SharedDevice,
    pub queue: Arc<dyn JobQueue>,
    pub publisher: Arc<dyn StatusPublisher>,
    pub metrics: Arc<Metrics>,
}

impl WorkerContext {
    pub fn new(
        config: Config,
        device: SharedDevice,
        queue: Arc<dyn JobQueue>,
        publisher: Arc<dyn StatusPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            device,
            queue,
            publisher,
            metrics,
        }
    }

    /// Open the configured device and wire up the in-process queue and
    /// broadcast publisher.
    pub fn local(config: Config) -> anyhow::Result<Self> {
        let device = open_device(&config.gpu)?;
        Self::local_with_device(config, device)
    }

    /// Same as [`WorkerContext::local`] with an already opened device.
    pub fn local_with_device(config: Config, device: SharedDevice) -> anyhow::Result<Self> {
        let queue = Arc::new(InMemoryQueue::new(config.worker.queue_name.clone()));
        let publisher = Arc::new(BroadcastPublisher::new(
            config.worker.status_channel.clone(),
            config.worker.event_buffer,
        ));
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self::new(config, device, queue, publisher, metrics))
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let device: SharedDevice = Arc::new(crate::gpu::SimulatedDevice::rtx_3050());
        match Self::local_with_device(Config::default(), device) {
            Ok(ctx) => ctx,
            Err(e) => panic!("test context: {e}"),
        }
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("device", &self.device.device_name())
            .field("queue", &self.queue.name())
            .field("channel", &self.publisher.channel())
            .finish()
    }
}
