//! Inter-stage queues
//!
//! Every edge in the pipeline graph is a bounded channel. Two backpressure
//! policies cover the two kinds of traffic a stage can produce:
//!
//! - `Blocking`: the producer waits for room. Used for audio, where dropping
//!   a chunk corrupts the downstream signal.
//! - `DropOldest`: a full queue evicts its oldest entry to make room for the
//!   new one, and reports the eviction as a `Metric { kind: Drop }` frame so
//!   the loss is visible rather than silent. Used for interim transcripts
//!   and metrics, where the latest value supersedes stale ones anyway.

use crate::frame::{Frame, MetricKind};
use crate::handle::SessionId;
use std::collections::VecDeque;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    Blocking,
    DropOldest,
}

/// Sending half of a stage-to-stage edge.
#[derive(Clone)]
pub struct FrameSender {
    policy: BackpressurePolicy,
    inner: SenderInner,
}

#[derive(Clone)]
enum SenderInner {
    Blocking(mpsc::Sender<Frame>),
    DropOldest(std::sync::Arc<Mutex<VecDeque<Frame>>>, std::sync::Arc<tokio::sync::Notify>, usize),
}

pub struct FrameReceiver {
    inner: ReceiverInner,
}

enum ReceiverInner {
    Blocking(mpsc::Receiver<Frame>),
    DropOldest(std::sync::Arc<Mutex<VecDeque<Frame>>>, std::sync::Arc<tokio::sync::Notify>),
}

/// Creates a bounded edge with the given capacity and policy. For
/// `DropOldest`, `session_id` is stamped onto the synthetic drop-metric
/// frame since the evicted frame's own identity is otherwise lost.
pub fn channel(capacity: usize, policy: BackpressurePolicy, session_id: SessionId) -> (FrameSender, FrameReceiver) {
    match policy {
        BackpressurePolicy::Blocking => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                FrameSender { policy, inner: SenderInner::Blocking(tx) },
                FrameReceiver { inner: ReceiverInner::Blocking(rx) },
            )
        }
        BackpressurePolicy::DropOldest => {
            let queue = std::sync::Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
            let notify = std::sync::Arc::new(tokio::sync::Notify::new());
            let _ = session_id;
            (
                FrameSender { policy, inner: SenderInner::DropOldest(queue.clone(), notify.clone(), capacity) },
                FrameReceiver { inner: ReceiverInner::DropOldest(queue, notify) },
            )
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("downstream stage closed its queue")]
pub struct SendError;

impl FrameSender {
    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Sends a frame, applying this edge's backpressure policy. Returns the
    /// dropped frame's synthetic `Metric` sibling when an eviction occurred,
    /// so the caller can forward it to the observer bus.
    pub async fn send(&self, frame: Frame) -> Result<Option<Frame>, SendError> {
        match &self.inner {
            SenderInner::Blocking(tx) => {
                tx.send(frame).await.map_err(|_| SendError)?;
                Ok(None)
            }
            SenderInner::DropOldest(queue, notify, capacity) => {
                let session_id = frame.session_id();
                let mut guard = queue.lock().await;
                let dropped = if guard.len() >= *capacity { guard.pop_front() } else { None };
                guard.push_back(frame);
                drop(guard);
                notify.notify_one();
                Ok(dropped.map(|_| Frame::Metric {
                    session_id,
                    turn_id: None,
                    stage: "queue",
                    kind: MetricKind::Drop,
                    value: 1.0,
                    t: std::time::SystemTime::now(),
                }))
            }
        }
    }
}

impl FrameReceiver {
    pub async fn recv(&mut self) -> Option<Frame> {
        match &mut self.inner {
            ReceiverInner::Blocking(rx) => rx.recv().await,
            ReceiverInner::DropOldest(queue, notify) => loop {
                let mut guard = queue.lock().await;
                if let Some(frame) = guard.pop_front() {
                    return Some(frame);
                }
                drop(guard);
                notify.notified().await;
            },
        }
    }

    /// Non-blocking drain, for callers that want to empty whatever is
    /// queued right now without waiting on the next push — e.g. draining a
    /// batch of interim transcripts once per `ingest_audio` call rather
    /// than one at a time.
    pub fn try_recv(&mut self) -> Option<Frame> {
        match &mut self.inner {
            ReceiverInner::Blocking(rx) => rx.try_recv().ok(),
            ReceiverInner::DropOldest(queue, _notify) => queue.try_lock().ok().and_then(|mut guard| guard.pop_front()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_frame(session_id: SessionId, text: &str) -> Frame {
        Frame::SttInterim { session_id, text: text.into(), speaker_id: None, t: std::time::SystemTime::now() }
    }

    #[tokio::test]
    async fn blocking_policy_delivers_every_frame_in_order() {
        let sid = SessionId::new();
        let (tx, mut rx) = channel(2, BackpressurePolicy::Blocking, sid);
        tx.send(text_frame(sid, "a")).await.unwrap();
        tx.send(text_frame(sid, "b")).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Frame::SttInterim { text, .. }) if text == "a"));
        assert!(matches!(rx.recv().await, Some(Frame::SttInterim { text, .. }) if text == "b"));
    }

    #[tokio::test]
    async fn drop_oldest_evicts_and_reports_a_metric() {
        let sid = SessionId::new();
        let (tx, mut rx) = channel(1, BackpressurePolicy::DropOldest, sid);
        let dropped = tx.send(text_frame(sid, "first")).await.unwrap();
        assert!(dropped.is_none());
        let dropped = tx.send(text_frame(sid, "second")).await.unwrap();
        assert!(matches!(dropped, Some(Frame::Metric { kind: MetricKind::Drop, .. })));
        let remaining = rx.recv().await.unwrap();
        assert!(matches!(remaining, Frame::SttInterim { text, .. } if text == "second"));
    }
}
