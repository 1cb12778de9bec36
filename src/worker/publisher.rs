//! Status notification channel.
//!
//! Publishing is fire-and-forget: no subscribers, a lagging subscriber or a
//! backend hiccup never fails the job that produced the event.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::jobs::JobStatusEvent;

pub trait StatusPublisher: Send + Sync {
    fn channel(&self) -> &str;

    fn publish(&self, event: &JobStatusEvent);

    /// Live feed of published events, when the backend can provide one.
    fn subscribe(&self) -> Option<broadcast::Receiver<JobStatusEvent>> {
        None
    }
}

/// In-process pub/sub on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    channel: String,
    tx: broadcast::Sender<JobStatusEvent>,
}

impl BroadcastPublisher {
    pub fn new(channel: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            channel: channel.into(),
            tx,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl StatusPublisher for BroadcastPublisher {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn publish(&self, event: &JobStatusEvent) {
        match self.tx.send(event.clone()) {
            Ok(receivers) => debug!(
                channel = %self.channel,
                job_id = %event.job_id,
                status = %event.status,
                receivers,
                "Status published"
            ),
            // No subscribers right now; the event is simply dropped.
            Err(_) => debug!(
                channel = %self.channel,
                job_id = %event.job_id,
                status = %event.status,
                "Status published with no subscribers"
            ),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<JobStatusEvent>> {
        Some(self.tx.subscribe())
    }
}

/// Publisher that records events in order, for inspection.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<JobStatusEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobStatusEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl StatusPublisher for RecordingPublisher {
    fn channel(&self) -> &str {
        "recording"
    }

    fn publish(&self, event: &JobStatusEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(_) => warn!(job_id = %event.job_id, "Recording publisher poisoned"),
        }
    }
}
