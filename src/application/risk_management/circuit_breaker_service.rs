//! Three-state Circuit Breaker over Risk State (spec §3 `kill_switch`,
//! §4.4). Transitions are event-sourced: every state change is handed back
//! to the caller as an `EventPayload::CircuitBreakerStateChanged` for the
//! Event Log to publish, never applied silently.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::risk::state::{KillSwitch, RiskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub consecutive_loss_limit: usize,
    pub max_daily_loss_usd: Decimal,
    pub max_daily_trades: u32,
    pub base_cooldown: chrono::Duration,
    pub max_cooldown: chrono::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_loss_limit: 5,
            max_daily_loss_usd: dec!(0),
            max_daily_trades: u32::MAX,
            base_cooldown: chrono::Duration::minutes(5),
            max_cooldown: chrono::Duration::hours(4),
        }
    }
}

/// Live (non-persisted) circuit state; `RiskState` is the durable source of
/// the inputs this machine evaluates, but the CLOSED/OPEN/HALF_OPEN
/// position and the current cooldown are process-local.
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    state: CircuitState,
    cooldown: chrono::Duration,
    opened_at: Option<DateTime<Utc>>,
    half_open_entry_used: bool,
}

impl CircuitBreakerService {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            cooldown: config.base_cooldown,
            opened_at: None,
            half_open_entry_used: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Evaluates entry triggers against the latest `RiskState` and operator
    /// kill-switch; transitions CLOSED -> OPEN when any trigger fires.
    /// Returns `Some(reason)` when a transition happened.
    pub fn evaluate(&mut self, risk_state: &RiskState, now: DateTime<Utc>) -> Option<String> {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at
                && now - opened_at >= self.cooldown
            {
                self.state = CircuitState::HalfOpen;
                self.half_open_entry_used = false;
                return Some("cooldown elapsed, entering half_open".to_string());
            }
            return None;
        }

        if matches!(risk_state.kill_switch, KillSwitch::Tripped { .. }) {
            return self.trip("operator kill-switch on".to_string(), now);
        }
        if risk_state.consecutive_losses >= self.config.consecutive_loss_limit {
            return self.trip(
                format!(
                    "consecutive_losses {} >= limit {}",
                    risk_state.consecutive_losses, self.config.consecutive_loss_limit
                ),
                now,
            );
        }
        if self.config.max_daily_loss_usd > Decimal::ZERO
            && risk_state.daily_pnl_usd <= -self.config.max_daily_loss_usd
        {
            return self.trip(
                format!(
                    "daily_pnl_usd {} breached -max_daily_loss {}",
                    risk_state.daily_pnl_usd, self.config.max_daily_loss_usd
                ),
                now,
            );
        }
        if risk_state.daily_trade_count >= self.config.max_daily_trades {
            return self.trip(
                format!(
                    "daily_trade_count {} >= max {}",
                    risk_state.daily_trade_count, self.config.max_daily_trades
                ),
                now,
            );
        }
        None
    }

    /// Forces OPEN regardless of the configured triggers, used when an
    /// external collaborator (reconciliation, a failed exchange health
    /// check) detects a problem the evaluate() triggers can't see.
    pub fn trip_external(&mut self, reason: String) -> Option<String> {
        self.trip(reason, Utc::now())
    }

    fn trip(&mut self, reason: String, now: DateTime<Utc>) -> Option<String> {
        if self.state == CircuitState::Open {
            return None;
        }
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        Some(reason)
    }

    /// Allows exactly one new entry while HALF_OPEN (spec §4.4).
    pub fn try_consume_half_open_entry(&mut self) -> bool {
        if self.state == CircuitState::HalfOpen && !self.half_open_entry_used {
            self.half_open_entry_used = true;
            true
        } else {
            false
        }
    }

    /// Records the outcome of the HALF_OPEN probe trade: WIN closes the
    /// circuit and resets the cooldown; LOSS reopens it with the cooldown
    /// doubled (capped at `max_cooldown`).
    pub fn record_half_open_outcome(&mut self, was_win: bool, now: DateTime<Utc>) {
        if self.state != CircuitState::HalfOpen {
            return;
        }
        if was_win {
            self.state = CircuitState::Closed;
            self.cooldown = self.config.base_cooldown;
            self.opened_at = None;
        } else {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.cooldown = (self.cooldown * 2).min(self.config.max_cooldown);
        }
    }

    pub fn blocks_new_entries(&self) -> bool {
        matches!(self.state, CircuitState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk_state() -> RiskState {
        RiskState::default()
    }

    #[test]
    fn consecutive_losses_trip_circuit_open() {
        let mut cb = CircuitBreakerService::new(CircuitBreakerConfig::default());
        let mut rs = risk_state();
        rs.consecutive_losses = 5;
        let reason = cb.evaluate(&rs, Utc::now());
        assert!(reason.is_some());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_allows_exactly_one_entry() {
        let mut cb = CircuitBreakerService::new(CircuitBreakerConfig::default());
        cb.state = CircuitState::HalfOpen;
        assert!(cb.try_consume_half_open_entry());
        assert!(!cb.try_consume_half_open_entry());
    }

    #[test]
    fn loss_in_half_open_doubles_cooldown_and_reopens() {
        let mut cb = CircuitBreakerService::new(CircuitBreakerConfig::default());
        cb.state = CircuitState::HalfOpen;
        let now = Utc::now();
        cb.record_half_open_outcome(false, now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.cooldown, chrono::Duration::minutes(10));
    }

    #[test]
    fn win_in_half_open_closes_circuit_and_resets_cooldown() {
        let mut cb = CircuitBreakerService::new(CircuitBreakerConfig::default());
        cb.state = CircuitState::HalfOpen;
        cb.cooldown = chrono::Duration::minutes(20);
        cb.record_half_open_outcome(true, Utc::now());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.cooldown, chrono::Duration::minutes(5));
    }
}
