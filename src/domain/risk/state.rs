use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kill-switch state. `Off` is normal; `TrippedReason` is operator- or
/// reconciliation-triggered and blocks all new entries until explicitly reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KillSwitch {
    Off,
    Tripped { reason: String },
}

impl Default for KillSwitch {
    fn default() -> Self {
        KillSwitch::Off
    }
}

/// Process-wide persistent risk counters (spec §3 `RiskState`). Owned
/// exclusively by the Risk Chamber / Circuit Breaker loop; every other
/// component only reads a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub schema_version: u32,
    pub id: String,

    /// Equity at the start of the current session (used by drawdown checks).
    pub session_start_equity: Decimal,
    /// Equity at the start of the current UTC trading day.
    pub daily_start_equity: Decimal,
    /// Highest equity ever observed this session.
    pub equity_high_water_mark: Decimal,

    pub daily_pnl_usd: Decimal,
    pub daily_losses_count: u32,
    pub daily_wins_count: u32,
    pub consecutive_losses: usize,
    pub daily_trade_count: u32,

    pub per_symbol_cooldown_until: HashMap<String, DateTime<Utc>>,

    pub kill_switch: KillSwitch,

    /// UTC calendar date the daily counters were last rolled over on.
    pub reference_date: NaiveDate,
    pub updated_at: i64,
}

impl Default for RiskState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            schema_version: 1,
            id: "global".to_string(),
            session_start_equity: Decimal::ZERO,
            daily_start_equity: Decimal::ZERO,
            equity_high_water_mark: Decimal::ZERO,
            daily_pnl_usd: Decimal::ZERO,
            daily_losses_count: 0,
            daily_wins_count: 0,
            consecutive_losses: 0,
            daily_trade_count: 0,
            per_symbol_cooldown_until: HashMap::new(),
            kill_switch: KillSwitch::Off,
            reference_date: now.date_naive(),
            updated_at: now.timestamp(),
        }
    }
}

impl RiskState {
    /// Rolls daily counters over if the UTC calendar date has advanced past
    /// `reference_date` (spec §3: "daily counters roll over at 00:00 UTC").
    /// Consecutive losses are intentionally NOT reset here; they only reset
    /// on a win (spec §3).
    pub fn roll_daily_if_needed(&mut self, now: DateTime<Utc>, current_equity: Decimal) {
        if now.date_naive() > self.reference_date {
            self.daily_start_equity = current_equity;
            self.daily_pnl_usd = Decimal::ZERO;
            self.daily_losses_count = 0;
            self.daily_wins_count = 0;
            self.daily_trade_count = 0;
            self.reference_date = now.date_naive();
        }
        if current_equity > self.equity_high_water_mark {
            self.equity_high_water_mark = current_equity;
        }
        self.updated_at = now.timestamp();
    }

    pub fn record_win(&mut self, pnl_usd: Decimal) {
        self.daily_pnl_usd += pnl_usd;
        self.daily_wins_count += 1;
        self.daily_trade_count += 1;
        self.consecutive_losses = 0;
    }

    pub fn record_loss(&mut self, pnl_usd: Decimal) {
        self.daily_pnl_usd += pnl_usd;
        self.daily_losses_count += 1;
        self.daily_trade_count += 1;
        self.consecutive_losses += 1;
    }

    pub fn set_symbol_cooldown(&mut self, symbol: &str, until: DateTime<Utc>) {
        self.per_symbol_cooldown_until.insert(symbol.to_string(), until);
    }

    pub fn is_symbol_in_cooldown(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.per_symbol_cooldown_until
            .get(symbol)
            .is_some_and(|until| now < *until)
    }
}
