//! Position Tracker: the single authoritative set of open positions (spec
//! §4.8). Mutated on fill (insert) and on close (remove); reconciled against
//! the exchange at startup and every 60s to catch ghost/orphan positions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::risk_management::circuit_breaker_service::CircuitBreakerService;
use crate::application::risk_management::target_engine::{TargetConfig, TargetEngine, Targets};
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::order::Order;
use crate::domain::ports::ExchangeRest;
use crate::domain::position::Position;
use crate::domain::repositories::{EventRepository, PositionRepository};

/// Shared, cloneable handle onto the open-position set. Every loop that
/// needs to read or mutate open positions (Executor, Watchdog, Outcome
/// Tracker, the HTTP status surface) holds one of these rather than the
/// `PositionTracker` itself.
#[derive(Clone)]
pub struct PositionBook {
    inner: Arc<RwLock<HashMap<String, Position>>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn from_positions(positions: Vec<Position>) -> Self {
        let map = positions.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self { inner: Arc::new(RwLock::new(map)) }
    }

    pub async fn insert(&self, position: Position) {
        self.inner.write().await.insert(position.id.clone(), position);
    }

    pub async fn remove(&self, position_id: &str) -> Option<Position> {
        self.inner.write().await.remove(position_id)
    }

    pub async fn get(&self, position_id: &str) -> Option<Position> {
        self.inner.read().await.get(position_id).cloned()
    }

    pub async fn find_by_symbol(&self, symbol: &str) -> Option<Position> {
        self.inner
            .read()
            .await
            .values()
            .find(|p| p.symbol == symbol)
            .cloned()
    }

    pub async fn update(&self, position: Position) {
        self.inner.write().await.insert(position.id.clone(), position);
    }

    pub async fn all(&self) -> Vec<Position> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn total_notional_usd(&self) -> Decimal {
        self.inner
            .read()
            .await
            .values()
            .map(|p| p.entry_price * p.remaining_quantity)
            .sum()
    }
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared read of the last reconciliation completion time; the Health
/// Service surfaces this directly in `GET /api/health` (spec §4.11).
pub type SharedReconcileClock = Arc<RwLock<Option<DateTime<Utc>>>>;

pub struct PositionTracker {
    book: PositionBook,
    repository: Arc<dyn PositionRepository>,
    exchange: Arc<dyn ExchangeRest>,
    event_repo: Arc<dyn EventRepository>,
    circuit: Arc<RwLock<CircuitBreakerService>>,
    last_reconciled_at: SharedReconcileClock,
}

impl PositionTracker {
    pub fn new(
        book: PositionBook,
        repository: Arc<dyn PositionRepository>,
        exchange: Arc<dyn ExchangeRest>,
        event_repo: Arc<dyn EventRepository>,
        circuit: Arc<RwLock<CircuitBreakerService>>,
    ) -> Self {
        Self {
            book,
            repository,
            exchange,
            event_repo,
            circuit,
            last_reconciled_at: Arc::new(RwLock::new(None)),
        }
    }

    pub fn book(&self) -> PositionBook {
        self.book.clone()
    }

    pub fn reconcile_clock(&self) -> SharedReconcileClock {
        self.last_reconciled_at.clone()
    }

    pub async fn run(self, symbols: Vec<String>, mut period: tokio::time::Interval, mut shutdown: ShutdownSignal) {
        if let Err(e) = self.reconcile(&symbols).await {
            warn!("startup position reconciliation failed: {}", e);
        }
        loop {
            tokio::select! {
                _ = period.tick() => {
                    if let Err(e) = self.reconcile(&symbols).await {
                        warn!("periodic position reconciliation failed: {}", e);
                    }
                }
                _ = shutdown.triggered() => {
                    warn!("position tracker stopping on shutdown signal");
                    break;
                }
            }
        }
    }

    /// Fetches exchange open orders for `symbols`, removes locally-held
    /// ghost positions absent remotely, and materializes a `Position` for
    /// every order present on the exchange but untracked locally so it
    /// comes under Watchdog/Outcome Tracker supervision (spec §4.8). A
    /// `reconcile_mismatch` event is emitted for every discrepancy found.
    pub async fn reconcile(&self, symbols: &[String]) -> anyhow::Result<()> {
        let remote_orders = self.exchange.open_orders(symbols).await?;
        let remote_symbols: std::collections::HashSet<&str> =
            remote_orders.iter().map(|o| o.symbol.as_str()).collect();

        let local = self.book.all().await;
        let mut mismatches = 0usize;

        for position in &local {
            if !remote_symbols.contains(position.symbol.as_str()) {
                mismatches += 1;
                self.book.remove(&position.id).await;
                self.publish_mismatch(&position.symbol, "ghost position removed: absent on exchange").await;
            }
        }
        for order in &remote_orders {
            if local.iter().all(|p| p.symbol != order.symbol) {
                mismatches += 1;
                let position = Self::materialize_orphan(order);
                self.book.insert(position).await;
                self.publish_mismatch(&order.symbol, "orphan order present on exchange, materialized for supervision").await;
            }
        }

        self.persist().await;
        *self.last_reconciled_at.write().await = Some(crate::domain::ids::now());

        if mismatches > 0 {
            warn!("{} position mismatches found during reconciliation, tripping circuit breaker", mismatches);
            let mut circuit = self.circuit.write().await;
            circuit.trip_external("reconcile_mismatch".to_string());
        } else {
            info!("position reconciliation clean, {} positions tracked", local.len());
        }
        Ok(())
    }

    /// Builds a supervisable `Position` from an orphan exchange order. The
    /// real exchange adapter never populates `tp_price`/`sl_price` on
    /// `open_orders()` results, so absent targets fall back to the default
    /// floor TP/SL rather than leaving the position untargeted.
    fn materialize_orphan(order: &Order) -> Position {
        let now = crate::domain::ids::now();
        let targets = Targets {
            tp_pct: TargetConfig::default().floor_tp_pct,
            sl_pct: TargetConfig::default().floor_sl_pct,
        };
        let (default_tp, default_sl) = TargetEngine::to_prices(order.entry_price_hint, targets);
        Position {
            schema_version: 1,
            id: crate::domain::ids::client_order_id(&order.correlation_id, "orphan-position"),
            correlation_id: order.correlation_id.clone(),
            symbol: order.symbol.clone(),
            entry_order_id: order.client_order_id.clone(),
            entry_price: order.entry_price_hint,
            quantity: order.quantity,
            remaining_quantity: order.quantity,
            tp_price: order.tp_price.unwrap_or(default_tp),
            sl_price: order.sl_price.unwrap_or(default_sl),
            trailing_stop_price: None,
            highest_price_seen: order.entry_price_hint,
            lowest_price_seen: order.entry_price_hint,
            partial_tp_taken: false,
            opened_at: order.created_at,
            timeout_at: now + chrono::Duration::hours(4),
        }
    }

    async fn publish_mismatch(&self, symbol: &str, detail: &str) {
        if let Ok(envelope) = EventEnvelope::new(
            "reconcile",
            Some(symbol),
            EventPayload::ReconcileMismatch { symbol: symbol.to_string(), detail: detail.to_string() },
        ) {
            let _ = self.event_repo.append(&envelope).await;
        }
    }

    async fn persist(&self) {
        let snapshot = self.book.all().await;
        if let Err(e) = self.repository.save_all(&snapshot).await {
            warn!("failed to persist position book: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_position(symbol: &str) -> Position {
        Position {
            schema_version: 1,
            id: format!("pos-{symbol}"),
            correlation_id: "corr-1".into(),
            symbol: symbol.to_string(),
            entry_order_id: "ord-1".into(),
            entry_price: dec!(100),
            quantity: dec!(1),
            remaining_quantity: dec!(1),
            tp_price: dec!(102),
            sl_price: dec!(99),
            trailing_stop_price: None,
            highest_price_seen: dec!(100),
            lowest_price_seen: dec!(100),
            partial_tp_taken: false,
            opened_at: Utc::now(),
            timeout_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn insert_and_remove_roundtrip() {
        let book = PositionBook::new();
        book.insert(sample_position("BTCUSDT")).await;
        assert_eq!(book.count().await, 1);
        book.remove("pos-BTCUSDT").await;
        assert_eq!(book.count().await, 0);
    }

    #[tokio::test]
    async fn total_notional_sums_remaining_quantity() {
        let book = PositionBook::new();
        book.insert(sample_position("BTCUSDT")).await;
        book.insert(sample_position("ETHUSDT")).await;
        assert_eq!(book.total_notional_usd().await, dec!(200));
    }
}
