//! Job queue collaborator.
//!
//! The worker only ever pops. `pop` is a bounded wait and must be cancel-safe:
//! dropping the future before it resolves must not lose a message.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use crate::jobs::JobEnvelope;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue {0} is closed")]
    Closed(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// A named, blocking FIFO of raw job envelopes.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Append an envelope at the tail.
    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout.
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, QueueError>;
}

/// In-process FIFO, used when the worker and its producers share a process.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append a raw message at the tail.
    pub fn push_raw(&self, raw: impl Into<String>) {
        self.lock().push_back(raw.into());
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_pop(&self) -> Option<String> {
        self.lock().pop_front()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        debug!(queue = %self.name, job_id = %envelope.job_id, "Job enqueued");
        self.push_raw(envelope.to_json());
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new("q");
        queue.push_raw("a");
        queue.push_raw("b");
        assert_eq!(queue.len(), 2);

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.pop(timeout).await.unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop(timeout).await.unwrap().as_deref(), Some("b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_envelope() {
        let queue = InMemoryQueue::new("q");
        let envelope = JobEnvelope {
            job_id: "5".to_string(),
            data: serde_json::json!({"jobType": "cloth-swap"}),
        };
        queue.enqueue(&envelope).await.unwrap();

        let raw = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(JobEnvelope::from_json(&raw).unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let queue = InMemoryQueue::new("q");
        let started = tokio::time::Instant::now();
        assert_eq!(queue.pop(Duration::from_millis(50)).await.unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(InMemoryQueue::new("q"));
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push_raw("late");
        });

        let item = queue.pop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(item.as_deref(), Some("late"));
    }
}
