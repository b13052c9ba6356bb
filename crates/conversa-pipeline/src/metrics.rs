//! Metrics store
//!
//! Keeps, per turn, the first-byte timestamps and durations reported by
//! `Metric` frames. A missing stage means an absent entry — the store never
//! fabricates a zero for a stage that simply never ran. Aggregation exposes
//! last/avg/min/max over a sliding window of turns, plus a small per-turn
//! table, matching the shape a data-channel snapshot publisher needs.

use crate::frame::MetricKind;
use crate::handle::TurnId;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct TurnMetrics {
    pub values: HashMap<MetricKind, f64>,
}

impl TurnMetrics {
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregate {
    pub last: Option<f64>,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

fn aggregate(values: &[f64]) -> Aggregate {
    if values.is_empty() {
        return Aggregate::default();
    }
    let sum: f64 = values.iter().sum();
    Aggregate {
        last: values.last().copied(),
        avg: Some(sum / values.len() as f64),
        min: values.iter().copied().fold(f64::INFINITY, f64::min).into(),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max).into(),
        count: values.len(),
    }
}

/// Read-only externally; the assembler's observer task is the sole writer.
pub struct MetricsStore {
    inner: RwLock<Inner>,
    window: usize,
    table_len: usize,
}

struct Inner {
    /// Insertion-ordered turn history, bounded to `window` most recent turns
    /// for aggregation purposes.
    history: VecDeque<(TurnId, TurnMetrics)>,
    last_snapshot_at: Option<Instant>,
}

impl MetricsStore {
    /// `window` bounds last/avg/min/max aggregation (default 100 turns);
    /// `table_len` bounds the exposed per-turn table (default 20 turns).
    pub fn new(window: usize, table_len: usize) -> Self {
        Self {
            inner: RwLock::new(Inner { history: VecDeque::new(), last_snapshot_at: None }),
            window,
            table_len,
        }
    }

    pub fn record(&self, turn_id: TurnId, kind: MetricKind, value: f64) {
        let mut inner = self.inner.write();
        if let Some((id, metrics)) = inner.history.back_mut() {
            if *id == turn_id {
                metrics.values.insert(kind, value);
                return;
            }
        }
        let mut metrics = TurnMetrics::default();
        metrics.values.insert(kind, value);
        inner.history.push_back((turn_id, metrics));
        while inner.history.len() > self.window {
            inner.history.pop_front();
        }
    }

    pub fn turn(&self, turn_id: TurnId) -> Option<TurnMetrics> {
        self.inner.read().history.iter().find(|(id, _)| *id == turn_id).map(|(_, m)| m.clone())
    }

    pub fn aggregate(&self, kind: MetricKind) -> Aggregate {
        let inner = self.inner.read();
        let values: Vec<f64> = inner.history.iter().filter_map(|(_, m)| m.get(kind)).collect();
        aggregate(&values)
    }

    /// The most recent `table_len` turns, each with whatever metrics were
    /// actually recorded for it — never padded with fabricated zeros.
    pub fn recent_table(&self) -> Vec<(TurnId, TurnMetrics)> {
        let inner = self.inner.read();
        inner.history.iter().rev().take(self.table_len).rev().cloned().collect()
    }

    /// True if at least `min_interval` has elapsed since the last accepted
    /// snapshot publish; also records the call as the new "last" time.
    /// Used by the data-channel bridge to rate-limit snapshot pushes to at
    /// most once per `observer.snapshot_ms`.
    pub fn should_publish_snapshot(&self, min_interval: std::time::Duration) -> bool {
        let mut inner = self.inner.write();
        let now = Instant::now();
        let due = match inner.last_snapshot_at {
            None => true,
            Some(last) => now.duration_since(last) >= min_interval,
        };
        if due {
            inner.last_snapshot_at = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_stage_is_absence_not_zero() {
        let store = MetricsStore::new(100, 20);
        let turn = TurnId::ZERO.next();
        store.record(turn, MetricKind::SttTtfb, 120.0);
        let metrics = store.turn(turn).unwrap();
        assert_eq!(metrics.get(MetricKind::SttTtfb), Some(120.0));
        assert_eq!(metrics.get(MetricKind::TtsTtfb), None);
    }

    #[test]
    fn aggregate_reports_last_avg_min_max() {
        let store = MetricsStore::new(100, 20);
        for (i, v) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            let turn = TurnId::ZERO.next();
            let turn = (0..i).fold(turn, |t, _| t.next());
            store.record(turn, MetricKind::LlmTtfb, v);
        }
        let agg = store.aggregate(MetricKind::LlmTtfb);
        assert_eq!(agg.count, 3);
        assert_eq!(agg.last, Some(300.0));
        assert_eq!(agg.min, Some(100.0));
        assert_eq!(agg.max, Some(300.0));
    }

    #[test]
    fn window_bounds_history_length() {
        let store = MetricsStore::new(2, 20);
        let mut turn = TurnId::ZERO;
        for v in [1.0, 2.0, 3.0] {
            turn = turn.next();
            store.record(turn, MetricKind::TotalMs, v);
        }
        assert_eq!(store.aggregate(MetricKind::TotalMs).count, 2);
    }

    #[test]
    fn snapshot_debounce_respects_interval() {
        let store = MetricsStore::new(10, 10);
        assert!(store.should_publish_snapshot(std::time::Duration::from_millis(500)));
        assert!(!store.should_publish_snapshot(std::time::Duration::from_millis(500)));
    }
}
