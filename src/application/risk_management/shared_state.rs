//! Read-only view of risk state shared across independent loops. The Risk
//! Chamber loop owns the authoritative `RiskStateManager`, `CircuitBreakerService`
//! and position book; every other loop (Decision Engine, HTTP status surface)
//! reads a `RiskSnapshot` instead of locking those directly.

use rust_decimal::Decimal;

use crate::application::risk_management::circuit_breaker_service::CircuitState;

#[derive(Debug, Clone, Copy)]
pub struct RiskSnapshot {
    pub circuit_state: CircuitState,
    pub kill_switch_tripped: bool,
    pub daily_pnl_usd: Decimal,
    pub daily_trade_count: u32,
    pub daily_wins_count: u32,
    pub daily_losses_count: u32,
    pub consecutive_losses: usize,
    pub open_positions_count: usize,
    pub open_notional_usd: Decimal,
    pub balance: Decimal,
}

impl RiskSnapshot {
    pub fn initial(balance: Decimal) -> Self {
        Self {
            circuit_state: CircuitState::Closed,
            kill_switch_tripped: false,
            daily_pnl_usd: Decimal::ZERO,
            daily_trade_count: 0,
            daily_wins_count: 0,
            daily_losses_count: 0,
            consecutive_losses: 0,
            open_positions_count: 0,
            open_notional_usd: Decimal::ZERO,
            balance,
        }
    }
}

pub type SharedRiskSnapshot = std::sync::Arc<tokio::sync::RwLock<RiskSnapshot>>;
