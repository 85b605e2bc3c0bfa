//! In-process counters pushed as `METRICS_JSON:{...}` log lines rather than
//! served from a pull-based endpoint (spec §11's `/api/health` is the pull
//! surface; this is deliberately simpler than wiring a Prometheus exporter).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    signals_processed: AtomicU64,
    signals_blocked: AtomicU64,
    decisions_buy: AtomicU64,
    decisions_skip: AtomicU64,
    orders_submitted: AtomicU64,
    orders_filled: AtomicU64,
    orders_rejected: AtomicU64,
}

/// Cheap to clone: every holder shares the same atomic counters.
#[derive(Clone, Default)]
pub struct Metrics {
    counters: Arc<Counters>,
}

/// A point-in-time read of every counter, plus the gauges supplied by the
/// caller at report time (open positions, circuit state) since those live
/// in shared application state this struct has no business depending on.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub signals_processed: u64,
    pub signals_blocked: u64,
    pub decisions_buy: u64,
    pub decisions_skip: u64,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub open_positions: usize,
    pub circuit_state: String,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_signal_processed(&self) {
        self.counters.signals_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal_blocked(&self) {
        self.counters.signals_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_buy(&self) {
        self.counters.decisions_buy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_skip(&self) {
        self.counters.decisions_skip.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_submitted(&self) {
        self.counters.orders_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_filled(&self) {
        self.counters.orders_filled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_rejected(&self) {
        self.counters.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, open_positions: usize, circuit_state: String) -> MetricsSnapshot {
        MetricsSnapshot {
            signals_processed: self.counters.signals_processed.load(Ordering::Relaxed),
            signals_blocked: self.counters.signals_blocked.load(Ordering::Relaxed),
            decisions_buy: self.counters.decisions_buy.load(Ordering::Relaxed),
            decisions_skip: self.counters.decisions_skip.load(Ordering::Relaxed),
            orders_submitted: self.counters.orders_submitted.load(Ordering::Relaxed),
            orders_filled: self.counters.orders_filled.load(Ordering::Relaxed),
            orders_rejected: self.counters.orders_rejected.load(Ordering::Relaxed),
            open_positions,
            circuit_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = Metrics::new();
        metrics.record_signal_processed();
        metrics.record_signal_processed();
        metrics.record_signal_blocked();
        metrics.record_decision_buy();

        let snapshot = metrics.snapshot(3, "closed".to_string());
        assert_eq!(snapshot.signals_processed, 2);
        assert_eq!(snapshot.signals_blocked, 1);
        assert_eq!(snapshot.decisions_buy, 1);
        assert_eq!(snapshot.decisions_skip, 0);
        assert_eq!(snapshot.open_positions, 3);
        assert_eq!(snapshot.circuit_state, "closed");
    }

    #[test]
    fn clone_shares_the_same_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_order_submitted();
        assert_eq!(metrics.snapshot(0, "closed".to_string()).orders_submitted, 1);
    }
}
