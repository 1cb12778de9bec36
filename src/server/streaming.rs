//! SSE (Server-Sent Events) stream of job status events.
//!
//! Each published [`JobStatusEvent`] becomes one `status` event whose data is
//! the same JSON object the worker publishes.

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::jobs::JobStatusEvent;

/// Convert a status event receiver into an SSE stream.
///
/// A subscriber that falls behind the broadcast buffer skips the events it
/// missed; delivery is at-most-once like the channel itself.
pub fn status_events_to_sse_stream(
    rx: broadcast::Receiver<JobStatusEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event("status").data(data)))
        }
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            warn!(missed, "Status stream subscriber lagged");
            None
        }
    })
}
