//! Observer bus
//!
//! Observers are passive subscribers to stage lifecycle events and `Metric`
//! frames; they never publish frames back into the graph. The bus is a
//! broadcast channel so metrics collection, transcript logging, and the
//! data-channel bridge can all subscribe independently without coordinating.

use crate::frame::Frame;
use tokio::sync::broadcast;

/// A stage lifecycle event, distinct from the `Metric`/`Error` frames that
/// flow through the graph itself — this is the side-channel a stage uses to
/// announce its own state without affecting the frames a downstream stage
/// sees.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started { stage: &'static str },
    FirstByte { stage: &'static str },
    Finished { stage: &'static str },
    Error { stage: &'static str, detail: String },
    /// A `Frame` observed in flight, broadcast read-only to every observer.
    FrameObserved(FrameObservation),
}

#[derive(Debug, Clone)]
pub struct FrameObservation {
    pub stage: &'static str,
    pub kind: &'static str,
}

impl From<&Frame> for FrameObservation {
    fn from(frame: &Frame) -> Self {
        FrameObservation { stage: "pipeline", kind: frame.kind() }
    }
}

/// Broadcast bus shared by every stage and the assembler for a single
/// session. Cloning is cheap — it shares the underlying sender.
#[derive(Clone)]
pub struct ObserverBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl ObserverBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: LifecycleEvent) {
        // No subscribers is not an error — observers are optional.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for ObserverBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = ObserverBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(LifecycleEvent::Started { stage: "stt" });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, LifecycleEvent::Started { stage: "stt" }));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_does_not_panic() {
        let bus = ObserverBus::new(8);
        bus.publish(LifecycleEvent::Finished { stage: "tts" });
    }
}
