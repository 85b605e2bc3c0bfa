//! Consumes operator/scheduler `RiskCommand`s (spec §6
//! `POST /circuit-breaker/reset`, `POST /kill-switch/{on|off}`) against the
//! shared `RiskStateManager`/`CircuitBreakerService` and refreshes the
//! `SharedRiskSnapshot` afterwards. Outcome-driven circuit transitions are
//! the Outcome Tracker's job (spec §4.10); this loop only applies external
//! commands and the periodic daily-rollover tick.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::application::agents::position_tracker::PositionBook;
use crate::application::risk_management::circuit_breaker_service::{CircuitBreakerConfig, CircuitBreakerService};
use crate::application::risk_management::commands::RiskCommand;
use crate::application::risk_management::risk_state_manager::RiskStateManager;
use crate::application::risk_management::shared_state::SharedRiskSnapshot;
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::risk::state::KillSwitch;

pub struct RiskCommandLoop {
    risk: Arc<RwLock<RiskStateManager>>,
    circuit: Arc<RwLock<CircuitBreakerService>>,
    book: PositionBook,
    snapshot: SharedRiskSnapshot,
}

impl RiskCommandLoop {
    pub fn new(
        risk: Arc<RwLock<RiskStateManager>>,
        circuit: Arc<RwLock<CircuitBreakerService>>,
        book: PositionBook,
        snapshot: SharedRiskSnapshot,
    ) -> Self {
        Self { risk, circuit, book, snapshot }
    }

    pub async fn run(self, mut cmd_rx: mpsc::Receiver<RiskCommand>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    info!(command = cmd.name(), "applying risk command");
                    self.handle(cmd).await;
                    self.refresh_snapshot().await;
                }
                _ = shutdown.triggered() => {
                    warn!("risk command loop stopping on shutdown signal");
                    break;
                }
                else => break,
            }
        }
    }

    async fn handle(&self, cmd: RiskCommand) {
        match cmd {
            RiskCommand::ResetCircuitBreaker => {
                let mut circuit = self.circuit.write().await;
                *circuit = CircuitBreakerService::new(CircuitBreakerConfig::default());
            }
            RiskCommand::KillSwitchOn { reason } => {
                self.risk.write().await.trip_kill_switch(reason).await;
            }
            RiskCommand::KillSwitchOff => {
                self.risk.write().await.reset_kill_switch().await;
            }
            RiskCommand::ValuationTick { current_equity } => {
                self.risk.write().await.tick(current_equity, crate::domain::ids::now()).await;
            }
        }
    }

    async fn refresh_snapshot(&self) {
        let risk = self.risk.read().await;
        let circuit = self.circuit.read().await;
        let state = risk.state();
        let mut snapshot = self.snapshot.write().await;
        snapshot.circuit_state = circuit.state();
        snapshot.kill_switch_tripped = matches!(state.kill_switch, KillSwitch::Tripped { .. });
        snapshot.daily_pnl_usd = state.daily_pnl_usd;
        snapshot.daily_trade_count = state.daily_trade_count;
        snapshot.daily_wins_count = state.daily_wins_count;
        snapshot.daily_losses_count = state.daily_losses_count;
        snapshot.consecutive_losses = state.consecutive_losses;
        snapshot.open_positions_count = self.book.count().await;
        snapshot.open_notional_usd = self.book.total_notional_usd().await;
    }
}
