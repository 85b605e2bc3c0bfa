//! Owns the single persisted `RiskState` document and its daily rollover
//! (spec §3, §4.4). Every write goes through `persist`, which the file-backed
//! `RiskStateRepository` implementation turns into an atomic
//! temp-write-fsync-rename (spec §4.1 durability note, §6).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::repositories::RiskStateRepository;
use crate::domain::risk::state::RiskState;

pub struct RiskStateManager {
    state: RiskState,
    repository: Arc<dyn RiskStateRepository>,
}

impl RiskStateManager {
    pub async fn load(repository: Arc<dyn RiskStateRepository>, current_equity: Decimal) -> Self {
        let mut state = match repository.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to load risk state, starting fresh: {}", e);
                let mut fresh = RiskState::default();
                fresh.session_start_equity = current_equity;
                fresh.daily_start_equity = current_equity;
                fresh.equity_high_water_mark = current_equity;
                fresh
            }
        };
        state.roll_daily_if_needed(Utc::now(), current_equity);
        Self { state, repository }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub async fn tick(&mut self, current_equity: Decimal, now: DateTime<Utc>) {
        let before = self.state.reference_date;
        self.state.roll_daily_if_needed(now, current_equity);
        if self.state.reference_date != before {
            info!("new trading day {}, daily counters reset", self.state.reference_date);
        }
        self.persist().await;
    }

    pub async fn record_win(&mut self, pnl_usd: Decimal) {
        self.state.record_win(pnl_usd);
        self.persist().await;
    }

    pub async fn record_loss(&mut self, pnl_usd: Decimal) {
        self.state.record_loss(pnl_usd);
        self.persist().await;
    }

    pub async fn set_symbol_cooldown(&mut self, symbol: &str, until: DateTime<Utc>) {
        self.state.set_symbol_cooldown(symbol, until);
        self.persist().await;
    }

    pub async fn trip_kill_switch(&mut self, reason: String) {
        self.state.kill_switch = crate::domain::risk::state::KillSwitch::Tripped { reason };
        self.persist().await;
    }

    pub async fn reset_kill_switch(&mut self) {
        self.state.kill_switch = crate::domain::risk::state::KillSwitch::Off;
        self.persist().await;
    }

    async fn persist(&mut self) {
        self.state.updated_at = Utc::now().timestamp();
        if let Err(e) = self.repository.save(&self.state).await {
            warn!("failed to persist risk state: {}", e);
        }
    }
}
