//! Session
//!
//! Ties together everything scoped to one connected peer for the lifetime
//! of its transport connection: its identity, rolling context, metrics
//! store, turn controller, and cancellation scope. A `Session` owns a
//! single root `CancellationToken`; each turn derives a child token from it
//! so a barge-in or turn-level error can be cancelled without tearing down
//! the whole connection.

use crate::context::Context;
use crate::handle::{SessionId, TurnId};
use crate::metrics::MetricsStore;
use crate::observer::ObserverBus;
use crate::turn::{TurnController, TurnControllerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct SessionConfig {
    pub token_budget: usize,
    pub turn: TurnControllerConfig,
    pub metrics_window: usize,
    pub metrics_table_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { token_budget: 4_000, turn: TurnControllerConfig::default(), metrics_window: 100, metrics_table_len: 20 }
    }
}

pub struct Session {
    pub id: SessionId,
    pub context: Context,
    pub turns: TurnController,
    pub metrics: Arc<MetricsStore>,
    pub observers: ObserverBus,
    cancellation: CancellationToken,
    active_turn_scope: Option<CancellationToken>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            context: Context::new(config.token_budget),
            turns: TurnController::new(config.turn),
            metrics: Arc::new(MetricsStore::new(config.metrics_window, config.metrics_table_len)),
            observers: ObserverBus::default(),
            cancellation: CancellationToken::new(),
            active_turn_scope: None,
        }
    }

    /// Root cancellation for the whole session — cancelled on disconnect or
    /// on an unrecoverable session-level error.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Allocates a new turn id and opens a fresh child cancellation scope
    /// for it, dropping any previous turn's scope.
    pub fn begin_turn(&mut self) -> (TurnId, CancellationToken) {
        let turn_id = self.turns.allocate_turn_id();
        let scope = self.cancellation.child_token();
        self.active_turn_scope = Some(scope.clone());
        (turn_id, scope)
    }

    /// Barge-in: cancel the in-flight turn's scope without touching the
    /// session's root token, so the transport and next turn keep running.
    pub fn interrupt_active_turn(&mut self) {
        if let Some(scope) = self.active_turn_scope.take() {
            scope.cancel();
        }
        self.turns.on_interrupt();
    }

    pub fn close(&self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_turn_allocates_increasing_ids() {
        let mut session = Session::new(SessionConfig::default());
        let (t1, _) = session.begin_turn();
        let (t2, _) = session.begin_turn();
        assert!(t2 > t1);
    }

    #[test]
    fn interrupt_cancels_only_the_turn_scope() {
        let mut session = Session::new(SessionConfig::default());
        let (_, turn_scope) = session.begin_turn();
        session.interrupt_active_turn();
        assert!(turn_scope.is_cancelled());
        assert!(!session.cancellation().is_cancelled());
    }

    #[test]
    fn close_cancels_the_root_scope() {
        let session = Session::new(SessionConfig::default());
        session.close();
        assert!(session.cancellation().is_cancelled());
    }
}
