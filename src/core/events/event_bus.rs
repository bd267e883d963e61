// Event bus port.
//
// Best-effort, push-based delivery to every other live context. No acknowledgement,
// no retry, no ordering across contexts; FIFO within a single subscription only.
// A publisher never receives its own envelopes back.

use super::envelope::{ContextId, Envelope, EnvelopeBody};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Delivery problems. Logged by the bus, never surfaced to callers of `publish`.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Dropped malformed frame: {0}")]
    Malformed(String),
    #[error("No live subscribers")]
    NoSubscribers,
}

pub trait EventBus: Send + Sync {
    /// The context this handle publishes as.
    fn origin(&self) -> &ContextId;

    /// Stamp, serialize and broadcast. Never blocks and never fails to the caller.
    fn publish(&self, body: EnvelopeBody, at: DateTime<Utc>);

    /// Open a new subscription. Envelopes published before this call are not seen.
    fn subscribe(&self) -> Box<dyn EnvelopeSource>;
}

/// The receiving end of a subscription.
#[async_trait]
pub trait EnvelopeSource: Send {
    /// Wait for the next envelope. `None` once the bus has shut down.
    async fn next(&mut self) -> Option<Envelope>;

    /// Take an already-delivered envelope without waiting.
    #[cfg(test)]
    fn try_next(&mut self) -> Option<Envelope>;
}

/// Something that reacts to inbound envelopes.
///
/// Handlers run inside the delivery loop, so they must not wait on I/O.
pub trait EnvelopeHandler: Send + Sync {
    fn handle(&self, envelope: Envelope);
}

/// Register a handler: spawn a task that feeds it every envelope from `source`, in order.
pub fn spawn_dispatch<H>(mut source: Box<dyn EnvelopeSource>, handler: Arc<H>) -> JoinHandle<()>
where
    H: EnvelopeHandler + ?Sized + 'static,
{
    tokio::spawn(async move {
        while let Some(envelope) = source.next().await {
            handler.handle(envelope);
        }
        tracing::debug!("Event bus closed, dispatch loop exiting");
    })
}
