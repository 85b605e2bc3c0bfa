//! Health/Heartbeat report shape (spec §4.11, §7 "user-visible failure").
//!
//! Kept to primitive/string fields only: `mode` and `circuit_state` are
//! rendered to their display strings by the caller, so this type carries no
//! dependency on the application or config layers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolStaleness {
    pub symbol: String,
    pub age_sec: i64,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub pnl_usd: Decimal,
    pub trade_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub consecutive_losses: usize,
}

/// Payload for `GET /api/health` and the periodic `Heartbeat` event
/// (spec §4.11). `ready=false` always comes with at least one diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub uptime_sec: u64,
    pub mode: String,
    pub open_positions: usize,
    pub daily_stats: DailyStats,
    pub circuit_state: String,
    pub price_staleness: Vec<SymbolStaleness>,
    pub last_event_log_append_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_reconciliation_at: Option<chrono::DateTime<chrono::Utc>>,
    pub exchange_reachable: bool,
    pub ready: bool,
    pub diagnostics: Vec<String>,
}

impl HealthReport {
    /// `ready=false` whenever at least one diagnostic was recorded.
    pub fn is_consistent(&self) -> bool {
        self.ready == self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ready: bool, diagnostics: Vec<String>) -> HealthReport {
        HealthReport {
            uptime_sec: 10,
            mode: "DRY".into(),
            open_positions: 0,
            daily_stats: DailyStats { pnl_usd: Decimal::ZERO, trade_count: 0, wins: 0, losses: 0, consecutive_losses: 0 },
            circuit_state: "closed".into(),
            price_staleness: vec![],
            last_event_log_append_at: None,
            last_reconciliation_at: None,
            exchange_reachable: true,
            ready,
            diagnostics,
        }
    }

    #[test]
    fn ready_with_no_diagnostics_is_consistent() {
        assert!(sample(true, vec![]).is_consistent());
    }

    #[test]
    fn not_ready_with_diagnostics_is_consistent() {
        assert!(sample(false, vec!["exchange unreachable".into()]).is_consistent());
    }

    #[test]
    fn ready_with_diagnostics_is_inconsistent() {
        assert!(!sample(true, vec!["stale".into()]).is_consistent());
    }
}
