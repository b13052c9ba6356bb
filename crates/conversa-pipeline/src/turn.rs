//! Turn controller
//!
//! Decides when a run of STT interim results becomes a committed turn. A
//! turn closes when either the transcript has been stable (unchanged) for
//! `stabilise_ms`, or `hard_deadline_ms` has elapsed since speech start,
//! whichever comes first — the hard deadline exists so a consistently
//! noisy STT stream can't stall a turn forever.
//!
//! Barge-in (new speech detected while TTS is still playing) is handled
//! upstream by feeding an `Interrupt` in; the controller just needs to
//! reset its own stability tracking when that happens.

use crate::handle::TurnId;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TurnControllerConfig {
    pub stabilise_ms: u64,
    pub hard_deadline_ms: u64,
}

impl Default for TurnControllerConfig {
    fn default() -> Self {
        Self { stabilise_ms: 700, hard_deadline_ms: 8_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDecision {
    /// Keep listening; transcript is still changing or the stability window
    /// hasn't elapsed.
    Continue,
    /// Close the turn with this transcript as final.
    Commit(String),
}

struct InProgress {
    last_text: String,
    last_change_at: Instant,
    speech_started_at: Instant,
}

/// One instance per session, reset between turns.
pub struct TurnController {
    config: TurnControllerConfig,
    next_turn_id: TurnId,
    in_progress: Option<InProgress>,
}

impl TurnController {
    pub fn new(config: TurnControllerConfig) -> Self {
        Self { config, next_turn_id: TurnId::ZERO, in_progress: None }
    }

    pub fn on_speech_started(&mut self, now: Instant) {
        self.in_progress = Some(InProgress {
            last_text: String::new(),
            last_change_at: now,
            speech_started_at: now,
        });
    }

    /// Feed an interim transcript; returns whether to keep listening or
    /// commit. `now` is threaded in explicitly so tests can drive time
    /// without sleeping.
    pub fn on_interim(&mut self, text: &str, now: Instant) -> TurnDecision {
        let Some(state) = self.in_progress.as_mut() else {
            return TurnDecision::Continue;
        };
        let changed = text != state.last_text;
        if changed {
            state.last_text = text.to_string();
            state.last_change_at = now;
        }
        let stable_for = now.duration_since(state.last_change_at);
        let elapsed = now.duration_since(state.speech_started_at);
        if (!changed && stable_for >= Duration::from_millis(self.config.stabilise_ms))
            || elapsed >= Duration::from_millis(self.config.hard_deadline_ms)
        {
            let text = state.last_text.clone();
            self.in_progress = None;
            return TurnDecision::Commit(text);
        }
        TurnDecision::Continue
    }

    /// Barge-in or an explicit stop: abandon in-progress stability tracking
    /// without committing whatever partial transcript existed.
    pub fn on_interrupt(&mut self) {
        self.in_progress = None;
    }

    pub fn allocate_turn_id(&mut self) -> TurnId {
        self.next_turn_id = self.next_turn_id.next();
        self.next_turn_id
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_after_stability_window() {
        let mut ctrl = TurnController::new(TurnControllerConfig { stabilise_ms: 100, hard_deadline_ms: 10_000 });
        let t0 = Instant::now();
        ctrl.on_speech_started(t0);
        assert_eq!(ctrl.on_interim("hello", t0), TurnDecision::Continue);
        assert_eq!(ctrl.on_interim("hello", t0 + Duration::from_millis(50)), TurnDecision::Continue);
        assert_eq!(
            ctrl.on_interim("hello", t0 + Duration::from_millis(150)),
            TurnDecision::Commit("hello".into())
        );
    }

    #[test]
    fn changing_transcript_resets_stability_clock() {
        let mut ctrl = TurnController::new(TurnControllerConfig { stabilise_ms: 100, hard_deadline_ms: 10_000 });
        let t0 = Instant::now();
        ctrl.on_speech_started(t0);
        ctrl.on_interim("hel", t0);
        assert_eq!(
            ctrl.on_interim("hello", t0 + Duration::from_millis(90)),
            TurnDecision::Continue
        );
        assert_eq!(
            ctrl.on_interim("hello", t0 + Duration::from_millis(210)),
            TurnDecision::Commit("hello".into())
        );
    }

    #[test]
    fn hard_deadline_forces_commit_despite_instability() {
        let mut ctrl = TurnController::new(TurnControllerConfig { stabilise_ms: 500, hard_deadline_ms: 300 });
        let t0 = Instant::now();
        ctrl.on_speech_started(t0);
        ctrl.on_interim("a", t0);
        assert_eq!(
            ctrl.on_interim("b", t0 + Duration::from_millis(310)),
            TurnDecision::Commit("b".into())
        );
    }

    #[test]
    fn interrupt_abandons_in_progress_turn() {
        let mut ctrl = TurnController::new(TurnControllerConfig::default());
        ctrl.on_speech_started(Instant::now());
        ctrl.on_interrupt();
        assert!(!ctrl.is_in_progress());
    }

    #[test]
    fn turn_ids_allocate_monotonically() {
        let mut ctrl = TurnController::new(TurnControllerConfig::default());
        let a = ctrl.allocate_turn_id();
        let b = ctrl.allocate_turn_id();
        assert!(b > a);
    }
}
