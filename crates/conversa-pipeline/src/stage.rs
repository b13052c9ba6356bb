//! Stage runtime
//!
//! A stage consumes one or more typed inputs, produces zero or more typed
//! outputs, and lets read-only observers watch its lifecycle. Stages never
//! talk to each other directly — only through the bounded queues the
//! pipeline assembler wires between them and through the observer bus.

use crate::error::StageError;
use crate::frame::Frame;
use crate::observer::{LifecycleEvent, ObserverBus};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a stage is being stopped. Drives whether `stop` should flush pending
/// state (normal) or just release resources quickly (cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
    FatalError,
}

/// Context handed to a stage at `start` and threaded through every
/// `process` call: the cancellation scope the stage must respect, and the
/// observer bus it may publish lifecycle events to.
pub struct StageContext {
    pub cancellation: CancellationToken,
    pub observers: ObserverBus,
}

impl StageContext {
    pub fn child(&self) -> StageContext {
        StageContext {
            cancellation: self.cancellation.child_token(),
            observers: self.observers.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// The stage trait every pipeline component implements.
///
/// `start`/`stop` bracket resource lifetime; `process` is the hot path and
/// must never block arbitrarily long without checking `ctx.cancellation`.
/// `stop` is guaranteed to run on every exit path, including when `process`
/// returns an error — the pipeline runner calls it from its cleanup path
/// unconditionally.
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    async fn start(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        let _ = ctx;
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext, frame: Frame) -> Result<Vec<Frame>, StageError>;

    /// Flush any buffered output; called once at normal end-of-stream.
    async fn flush(&mut self, ctx: &StageContext) -> Result<Vec<Frame>, StageError> {
        let _ = ctx;
        Ok(vec![])
    }

    async fn stop(&mut self, ctx: &StageContext, reason: StopReason) -> Result<(), StageError> {
        let _ = (ctx, reason);
        Ok(())
    }
}

/// Per-stage retry budget for transient errors (§4.B failure semantics).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32 << attempt.min(6));
        scaled.min(self.max_delay)
    }
}

/// Runs a single frame through a stage, applying the retry policy to
/// transient errors and publishing lifecycle events. Fatal errors are
/// returned to the caller, which is responsible for emitting an `Error`
/// frame upstream and deciding whether the turn (or session) can continue.
pub async fn process_with_retry(
    stage: &mut dyn Stage,
    ctx: &StageContext,
    frame: Frame,
    policy: &RetryPolicy,
) -> Result<Vec<Frame>, StageError> {
    let mut attempt = 0;
    loop {
        match stage.process(ctx, frame.clone()).await {
            Ok(out) => return Ok(out),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_for_attempt(attempt);
                warn!(stage = stage.name(), attempt, ?delay, %err, "transient stage error, retrying");
                ctx.observers.publish(LifecycleEvent::Error {
                    stage: stage.name(),
                    detail: err.to_string(),
                });
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancellation.cancelled() => return Err(err),
                }
                attempt += 1;
            }
            Err(err) => {
                debug!(stage = stage.name(), %err, "stage error, not retrying");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStage;

    #[async_trait]
    impl Stage for EchoStage {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn process(&mut self, _ctx: &StageContext, frame: Frame) -> Result<Vec<Frame>, StageError> {
            Ok(vec![frame])
        }
    }

    struct FlakyStage {
        failures_left: u32,
    }

    #[async_trait]
    impl Stage for FlakyStage {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn process(&mut self, _ctx: &StageContext, frame: Frame) -> Result<Vec<Frame>, StageError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StageError::ResourceExhausted("simulated".into()));
            }
            Ok(vec![frame])
        }
    }

    fn test_ctx() -> StageContext {
        StageContext {
            cancellation: CancellationToken::new(),
            observers: ObserverBus::new(16),
        }
    }

    #[tokio::test]
    async fn echo_stage_passes_frame_through() {
        let mut stage = EchoStage;
        let ctx = test_ctx();
        let frame = Frame::End { session_id: crate::handle::SessionId::new() };
        let out = stage.process(&ctx, frame.clone()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), frame.kind());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let mut stage = FlakyStage { failures_left: 2 };
        let ctx = test_ctx();
        let policy = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let frame = Frame::End { session_id: crate::handle::SessionId::new() };
        let out = process_with_retry(&mut stage, &ctx, frame, &policy).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_exhausted() {
        let mut stage = FlakyStage { failures_left: 10 };
        let ctx = test_ctx();
        let policy = RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let frame = Frame::End { session_id: crate::handle::SessionId::new() };
        let err = process_with_retry(&mut stage, &ctx, frame, &policy).await.unwrap_err();
        assert!(err.is_transient());
    }
}
