//! Tracks in-flight entry orders per symbol, enforcing Signal Gate guard 7's
//! "≤1 pending entry per symbol" (spec §4.5) and surfacing stale pending
//! orders for the timeout sweep (spec §B.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

pub struct PendingOrdersTracker {
    pending: HashMap<String, DateTime<Utc>>,
}

impl Default for PendingOrdersTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOrdersTracker {
    pub fn new() -> Self {
        Self { pending: HashMap::new() }
    }

    pub fn has_pending_entry(&self, symbol: &str) -> bool {
        self.pending.contains_key(symbol)
    }

    pub fn mark_pending(&mut self, symbol: &str, now: DateTime<Utc>) {
        self.pending.insert(symbol.to_string(), now);
    }

    pub fn clear(&mut self, symbol: &str) {
        self.pending.remove(symbol);
    }

    pub fn sweep_stale(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, since)| now - **since > ttl)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        for symbol in &stale {
            self.pending.remove(symbol);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_for_same_symbol_is_rejected_until_cleared() {
        let mut tracker = PendingOrdersTracker::new();
        let now = Utc::now();
        tracker.mark_pending("PEPEUSDT", now);
        assert!(tracker.has_pending_entry("PEPEUSDT"));
        tracker.clear("PEPEUSDT");
        assert!(!tracker.has_pending_entry("PEPEUSDT"));
    }

    #[test]
    fn sweep_removes_entries_older_than_ttl() {
        let mut tracker = PendingOrdersTracker::new();
        let now = Utc::now();
        tracker.mark_pending("PEPEUSDT", now - chrono::Duration::seconds(120));
        let stale = tracker.sweep_stale(now, chrono::Duration::seconds(60));
        assert_eq!(stale, vec!["PEPEUSDT".to_string()]);
        assert!(!tracker.has_pending_entry("PEPEUSDT"));
    }
}
