//! Outcome Tracker: the sole writer of trade results into Risk State and
//! the sole trigger for Circuit Breaker evaluation (spec §4.10). The Order
//! Executor hands over every fill that closes a position; nothing else is
//! allowed to call `record_win`/`record_loss` or feed the breaker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, instrument, warn};

use crate::application::agents::position_tracker::PositionBook;
use crate::application::risk_management::circuit_breaker_service::{CircuitBreakerService, CircuitState};
use crate::application::risk_management::risk_state_manager::RiskStateManager;
use crate::application::risk_management::shared_state::{RiskSnapshot, SharedRiskSnapshot};
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::ids;
use crate::domain::outcome::{Outcome, OutcomeLabel};
use crate::domain::ports::{ExchangeRest, Notifier};
use crate::domain::position::{ExitReason, Position};
use crate::domain::repositories::EventRepository;

/// A position the Order Executor just finished closing; the trigger for
/// every downstream bookkeeping step the Outcome Tracker owns.
#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_reason: ExitReason,
    pub fill_price: Decimal,
    pub closed_at: DateTime<Utc>,
}

pub struct OutcomeTracker {
    event_repo: Arc<dyn EventRepository>,
    exchange: Arc<dyn ExchangeRest>,
    book: PositionBook,
    risk: Arc<RwLock<RiskStateManager>>,
    circuit: Arc<RwLock<CircuitBreakerService>>,
    risk_snapshot: SharedRiskSnapshot,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_repo: Arc<dyn EventRepository>,
        exchange: Arc<dyn ExchangeRest>,
        book: PositionBook,
        risk: Arc<RwLock<RiskStateManager>>,
        circuit: Arc<RwLock<CircuitBreakerService>>,
        risk_snapshot: SharedRiskSnapshot,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { event_repo, exchange, book, risk, circuit, risk_snapshot, notifier }
    }

    pub async fn run(mut self, mut closed_rx: mpsc::Receiver<ClosedPosition>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                Some(closed) = closed_rx.recv() => {
                    self.handle_closed(closed).await;
                }
                _ = shutdown.triggered() => {
                    warn!("outcome tracker stopping on shutdown signal");
                    break;
                }
                else => break,
            }
        }
    }

    #[instrument(skip(self, closed), fields(symbol = %closed.position.symbol, position_id = %closed.position.id))]
    async fn handle_closed(&mut self, closed: ClosedPosition) {
        let position = &closed.position;
        let pnl_usd = (closed.fill_price - position.entry_price) * position.remaining_quantity;
        let pnl_pct = position.unrealized_pnl_pct(closed.fill_price);
        let label = OutcomeLabel::from_pnl(pnl_usd);

        let outcome = Outcome {
            schema_version: 1,
            id: ids::client_order_id(&position.correlation_id, "outcome"),
            correlation_id: position.correlation_id.clone(),
            symbol: position.symbol.clone(),
            position_id: position.id.clone(),
            entry_price: position.entry_price,
            exit_price: closed.fill_price,
            quantity: position.remaining_quantity,
            pnl_usd,
            pnl_pct,
            mfe_pct: position.mfe_pct(),
            mae_pct: position.mae_pct(),
            duration_sec: (closed.closed_at - position.opened_at).num_seconds(),
            exit_reason: closed.exit_reason,
            label,
            opened_at: position.opened_at,
            closed_at: closed.closed_at,
        };

        self.apply_to_risk_state(outcome.is_win(), pnl_usd).await;

        let now = ids::now();
        self.apply_symbol_cooldown(&position.symbol, now).await;
        let transition = self.settle_circuit(outcome.is_win(), now).await;
        if let Some((from, to, reason)) = transition {
            self.publish_circuit_transition(from, to, reason).await;
        }

        self.refresh_snapshot().await;

        info!(label = %outcome.label, pnl_usd = %outcome.pnl_usd, "trade outcome recorded");
        if let Ok(envelope) = EventEnvelope::new(
            &outcome.correlation_id,
            Some(&outcome.symbol),
            EventPayload::OutcomeRecorded { outcome },
        ) {
            if let Err(e) = self.event_repo.append(&envelope).await {
                warn!("event log append failed: {}", e);
            }
        }
    }

    async fn apply_to_risk_state(&self, is_win: bool, pnl_usd: Decimal) {
        let mut risk = self.risk.write().await;
        if is_win {
            risk.record_win(pnl_usd).await;
        } else {
            risk.record_loss(pnl_usd).await;
        }
    }

    /// Every close, win or loss, puts the symbol in a 30s cooldown so the
    /// Signal Gate won't immediately re-enter on the next tick's noise.
    async fn apply_symbol_cooldown(&self, symbol: &str, now: DateTime<Utc>) {
        let cooldown_until = now + chrono::Duration::seconds(30);
        self.risk.write().await.set_symbol_cooldown(symbol, cooldown_until).await;
    }

    /// Feeds the Outcome into the breaker: a HALF_OPEN probe settles via
    /// `record_half_open_outcome`; otherwise the breaker re-evaluates its
    /// entry triggers against the freshly updated `RiskState` (spec §4.10:
    /// "Outcome is the sole signal for Circuit Breaker transitions").
    async fn settle_circuit(&self, is_win: bool, now: DateTime<Utc>) -> Option<(CircuitState, CircuitState, String)> {
        let mut circuit = self.circuit.write().await;
        let from = circuit.state();
        if from == CircuitState::HalfOpen {
            circuit.record_half_open_outcome(is_win, now);
            let to = circuit.state();
            return (to != from).then(|| {
                let reason = if is_win { "half_open probe won, circuit closed".to_string() } else { "half_open probe lost, circuit reopened".to_string() };
                (from, to, reason)
            });
        }
        let risk = self.risk.read().await;
        let reason = circuit.evaluate(risk.state(), now)?;
        Some((from, circuit.state(), reason))
    }

    async fn publish_circuit_transition(&self, from: CircuitState, to: CircuitState, reason: String) {
        warn!(%from, %to, %reason, "circuit breaker transitioned");
        if to == CircuitState::Open
            && let Err(e) = self.notifier.notify("circuit breaker OPEN", &reason).await
        {
            warn!("failed to send circuit breaker notification: {}", e);
        }
        if let Ok(envelope) = EventEnvelope::new(
            "system",
            None,
            EventPayload::CircuitBreakerStateChanged { from: from.to_string(), to: to.to_string(), reason },
        ) {
            let _ = self.event_repo.append(&envelope).await;
        }
    }

    async fn refresh_snapshot(&self) {
        let balance = match self.exchange.account_balances().await {
            Ok(b) => b.equity(),
            Err(e) => {
                warn!("failed to refresh balance for risk snapshot: {}", e);
                self.risk_snapshot.read().await.balance
            }
        };
        let open_positions_count = self.book.count().await;
        let open_notional_usd = self.book.total_notional_usd().await;
        let risk = self.risk.read().await;
        let circuit = self.circuit.read().await;

        let mut snapshot = self.risk_snapshot.write().await;
        *snapshot = RiskSnapshot {
            circuit_state: circuit.state(),
            kill_switch_tripped: matches!(risk.state().kill_switch, crate::domain::risk::state::KillSwitch::Tripped { .. }),
            daily_pnl_usd: risk.state().daily_pnl_usd,
            daily_trade_count: risk.state().daily_trade_count,
            daily_wins_count: risk.state().daily_wins_count,
            daily_losses_count: risk.state().daily_losses_count,
            consecutive_losses: risk.state().consecutive_losses,
            open_positions_count,
            open_notional_usd,
            balance,
        };
    }
}
