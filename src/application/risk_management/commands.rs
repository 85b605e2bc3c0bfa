//! Command Pattern abstraction for the Risk/Circuit-Breaker loop: every
//! operator or scheduler-driven action routed into it from the HTTP surface
//! or bootstrap timers (spec §6 `POST /circuit-breaker/reset`,
//! `POST /kill-switch/{on|off}`) arrives as one of these variants.

#[derive(Debug, Clone)]
pub enum RiskCommand {
    ResetCircuitBreaker,
    KillSwitchOn { reason: String },
    KillSwitchOff,
    /// Periodic daily-rollover / high-water-mark tick (driven by bootstrap's
    /// interval timer, not by any external caller).
    ValuationTick { current_equity: rust_decimal::Decimal },
}

impl RiskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResetCircuitBreaker => "ResetCircuitBreaker",
            Self::KillSwitchOn { .. } => "KillSwitchOn",
            Self::KillSwitchOff => "KillSwitchOff",
            Self::ValuationTick { .. } => "ValuationTick",
        }
    }
}
