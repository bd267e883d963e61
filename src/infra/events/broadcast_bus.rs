// In-process event bus on top of a tokio broadcast channel.
//
// Frames travel as serialized JSON so every subscriber decodes its own copy, the
// same as it would off a socket. The channel is bounded: a subscriber that falls
// behind loses the oldest frames and logs how many it skipped.

use crate::core::events::{BusError, ContextId, Envelope, EnvelopeBody, EnvelopeSource, EventBus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

type Frame = Arc<str>;

/// The shared medium. Every context gets its own `BroadcastBus` handle from it.
pub struct BroadcastHub {
    sender: broadcast::Sender<Frame>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A handle for a new context, with a freshly generated context id.
    pub fn handle(&self) -> BroadcastBus {
        BroadcastBus {
            origin: ContextId::generate(),
            sender: self.sender.clone(),
        }
    }

    /// Push a raw frame onto the channel, bypassing encoding.
    #[cfg(test)]
    pub fn send_raw(&self, frame: &str) {
        let _ = self.sender.send(Frame::from(frame));
    }
}

pub struct BroadcastBus {
    origin: ContextId,
    sender: broadcast::Sender<Frame>,
}

impl EventBus for BroadcastBus {
    fn origin(&self) -> &ContextId {
        &self.origin
    }

    fn publish(&self, body: EnvelopeBody, at: DateTime<Utc>) {
        let envelope = Envelope::new(self.origin.clone(), at, body);
        let kind = envelope.kind();

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                let err = BusError::from(e);
                tracing::warn!(kind, origin = %self.origin, "{}", err);
                return;
            }
        };

        match self.sender.send(Frame::from(frame)) {
            Ok(receivers) => tracing::trace!(kind, receivers, "Envelope published"),
            Err(_) => tracing::debug!(kind, "{}", BusError::NoSubscribers),
        }
    }

    fn subscribe(&self) -> Box<dyn EnvelopeSource> {
        Box::new(BroadcastSource {
            origin: self.origin.clone(),
            receiver: self.sender.subscribe(),
        })
    }
}

/// One subscription. Drops envelopes its own context published.
pub struct BroadcastSource {
    origin: ContextId,
    receiver: broadcast::Receiver<Frame>,
}

impl BroadcastSource {
    fn accept(&self, frame: &str) -> Option<Envelope> {
        match Envelope::decode(frame) {
            Ok(envelope) if envelope.origin == self.origin => None,
            Ok(envelope) => Some(envelope),
            Err(e) => {
                let err = BusError::Malformed(e.to_string());
                tracing::warn!(origin = %self.origin, "{}", err);
                None
            }
        }
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(origin = %self.origin, skipped, "Subscriber lagged, envelopes dropped");
    }
}

#[async_trait]
impl EnvelopeSource for BroadcastSource {
    async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => {
                    if let Some(envelope) = self.accept(&frame) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    #[cfg(test)]
    fn try_next(&mut self) -> Option<Envelope> {
        use tokio::sync::broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    if let Some(envelope) = self.accept(&frame) {
                        return Some(envelope);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{EnvelopeHandler, SystemNotice};
    use std::sync::Mutex;

    fn notice(text: &str) -> EnvelopeBody {
        EnvelopeBody::System(SystemNotice {
            scope: None,
            text: text.to_string(),
        })
    }

    fn text_of(envelope: &Envelope) -> String {
        match &envelope.body {
            EnvelopeBody::System(notice) => notice.text.clone(),
            other => panic!("unexpected envelope kind {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_other_contexts_receive_but_the_publisher_does_not() {
        let hub = BroadcastHub::new(16);
        let a = hub.handle();
        let b = hub.handle();
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.publish(notice("hello"), Utc::now());

        let received = b_rx.try_next().expect("b should see a's envelope");
        assert_eq!(text_of(&received), "hello");
        assert_eq!(&received.origin, a.origin());
        assert!(a_rx.try_next().is_none());
    }

    #[tokio::test]
    async fn test_delivery_is_fifo_per_subscription() {
        let hub = BroadcastHub::new(16);
        let a = hub.handle();
        let mut b_rx = hub.handle().subscribe();

        for text in ["one", "two", "three"] {
            a.publish(notice(text), Utc::now());
        }

        let texts: Vec<String> = std::iter::from_fn(|| b_rx.try_next())
            .map(|e| text_of(&e))
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let hub = BroadcastHub::new(16);
        let a = hub.handle();
        let mut b_rx = hub.handle().subscribe();

        hub.send_raw("{not json");
        hub.send_raw(r#"{"origin":"x","origin_timestamp":"2024-01-01T00:00:00Z","body":{"kind":"nope"}}"#);
        a.publish(notice("still works"), Utc::now());

        let received = b_rx.try_next().unwrap();
        assert_eq!(text_of(&received), "still works");
        assert!(b_rx.try_next().is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_the_newest_frames() {
        let hub = BroadcastHub::new(2);
        let a = hub.handle();
        let mut b_rx = hub.handle().subscribe();

        for i in 0..5 {
            a.publish(notice(&i.to_string()), Utc::now());
        }

        let texts: Vec<String> = std::iter::from_fn(|| b_rx.try_next())
            .map(|e| text_of(&e))
            .collect();
        assert_eq!(texts, vec!["3", "4"]);
    }

    #[tokio::test]
    async fn test_publishing_without_subscribers_is_harmless() {
        let hub = BroadcastHub::new(4);
        hub.handle().publish(notice("anyone?"), Utc::now());
    }

    struct Collect(Mutex<Vec<String>>);

    impl EnvelopeHandler for Collect {
        fn handle(&self, envelope: Envelope) {
            self.0.lock().unwrap().push(text_of(&envelope));
        }
    }

    #[tokio::test]
    async fn test_dispatch_loop_ends_when_the_bus_closes() {
        let hub = BroadcastHub::new(8);
        let a = hub.handle();
        let b = hub.handle();
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let task = crate::core::events::spawn_dispatch(b.subscribe(), collect.clone());

        a.publish(notice("before close"), Utc::now());
        drop(a);
        drop(b);
        drop(hub);

        task.await.unwrap();
        assert_eq!(*collect.0.lock().unwrap(), vec!["before close".to_string()]);
    }
}
