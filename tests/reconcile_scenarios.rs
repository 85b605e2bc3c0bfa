use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hope::application::agents::position_tracker::{PositionBook, PositionTracker};
use hope::application::risk_management::circuit_breaker_service::{
    CircuitBreakerConfig, CircuitBreakerService, CircuitState,
};
use hope::domain::events::EventEnvelope;
use hope::domain::order::{Order, OrderSide};
use hope::domain::ports::{AccountBalances, ExchangeRest, OrderBookTop, OrderFill};
use hope::domain::position::Position;
use hope::domain::repositories::{EventRepository, PositionRepository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

struct StubExchange {
    open_orders: Vec<Order>,
}

#[async_trait]
impl ExchangeRest for StubExchange {
    async fn place_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: &str) -> anyhow::Result<OrderFill> {
        unreachable!()
    }
    async fn place_ioc_limit_order(&self, _: &str, _: OrderSide, _: Decimal, _: Decimal, _: &str) -> anyhow::Result<Option<OrderFill>> {
        unreachable!()
    }
    async fn place_oco_exit(&self, _: &str, _: Decimal, _: Decimal, _: Decimal, _: Decimal, _: &str) -> anyhow::Result<()> {
        unreachable!()
    }
    async fn cancel_order(&self, _: &str, _: &str) -> anyhow::Result<()> {
        unreachable!()
    }
    async fn order_book_top(&self, _: &str) -> anyhow::Result<OrderBookTop> {
        unreachable!()
    }
    async fn account_balances(&self) -> anyhow::Result<AccountBalances> {
        unreachable!()
    }
    async fn open_orders(&self, _: &[String]) -> anyhow::Result<Vec<Order>> {
        Ok(self.open_orders.clone())
    }
    async fn exchange_info_24h_volume(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        unreachable!()
    }
}

struct NoopPositionRepository;

#[async_trait]
impl PositionRepository for NoopPositionRepository {
    async fn load_all(&self) -> anyhow::Result<Vec<Position>> {
        Ok(vec![])
    }
    async fn save_all(&self, _: &[Position]) -> anyhow::Result<()> {
        Ok(())
    }
}

struct NoopEventRepository;

#[async_trait]
impl EventRepository for NoopEventRepository {
    async fn append(&self, _: &EventEnvelope) -> anyhow::Result<()> {
        Ok(())
    }
    async fn replay(&self, _: chrono::DateTime<chrono::Utc>, _: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<EventEnvelope>> {
        Ok(vec![])
    }
    async fn recent(&self, _: usize) -> anyhow::Result<Vec<EventEnvelope>> {
        Ok(vec![])
    }
}

fn sample_position(symbol: &str) -> Position {
    let now = hope::domain::ids::now();
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
        opened_at: now,
        timeout_at: now + chrono::Duration::hours(1),
    }
}

fn sample_order(symbol: &str) -> Order {
    Order::new_entry("corr-1", symbol, OrderSide::Buy, dec!(1), dec!(100), hope::domain::order::OrderKind::Market)
}

#[tokio::test]
async fn ghost_position_is_removed_and_trips_circuit_breaker() {
    let book = PositionBook::new();
    book.insert(sample_position("ABCUSDT")).await;

    let exchange = Arc::new(StubExchange { open_orders: vec![] });
    let circuit = Arc::new(RwLock::new(CircuitBreakerService::new(CircuitBreakerConfig::default())));

    let tracker = PositionTracker::new(
        book.clone(),
        Arc::new(NoopPositionRepository),
        exchange,
        Arc::new(NoopEventRepository),
        circuit.clone(),
    );

    tracker.reconcile(&["ABCUSDT".to_string()]).await.unwrap();

    assert_eq!(book.count().await, 0, "ghost position should be removed from the book");
    assert_eq!(circuit.read().await.state(), CircuitState::Open);
}

#[tokio::test]
async fn orphan_order_is_materialized_into_the_book() {
    let book = PositionBook::new();
    let exchange = Arc::new(StubExchange { open_orders: vec![sample_order("XYZUSDT")] });
    let circuit = Arc::new(RwLock::new(CircuitBreakerService::new(CircuitBreakerConfig::default())));

    let tracker = PositionTracker::new(
        book.clone(),
        Arc::new(NoopPositionRepository),
        exchange,
        Arc::new(NoopEventRepository),
        circuit.clone(),
    );

    tracker.reconcile(&["XYZUSDT".to_string()]).await.unwrap();

    assert_eq!(book.count().await, 1, "an orphan order is materialized into a supervised position");
    let materialized = book.find_by_symbol("XYZUSDT").await.expect("materialized position present");
    assert_eq!(materialized.entry_price, dec!(100));
    assert!(materialized.tp_price > materialized.entry_price);
    assert!(materialized.sl_price < materialized.entry_price);
    assert_eq!(circuit.read().await.state(), CircuitState::Open, "an orphan is still a mismatch");
}

#[tokio::test]
async fn matching_state_leaves_circuit_closed() {
    let book = PositionBook::new();
    book.insert(sample_position("ABCUSDT")).await;
    let exchange = Arc::new(StubExchange { open_orders: vec![sample_order("ABCUSDT")] });
    let circuit = Arc::new(RwLock::new(CircuitBreakerService::new(CircuitBreakerConfig::default())));

    let tracker = PositionTracker::new(
        book.clone(),
        Arc::new(NoopPositionRepository),
        exchange,
        Arc::new(NoopEventRepository),
        circuit.clone(),
    );

    tracker.reconcile(&["ABCUSDT".to_string()]).await.unwrap();

    assert_eq!(book.count().await, 1);
    assert_eq!(circuit.read().await.state(), CircuitState::Closed);
}
