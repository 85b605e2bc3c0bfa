use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hope::application::agents::executor::{ExecutorConfig, OrderExecutor};
use hope::application::agents::position_tracker::PositionBook;
use hope::application::risk_management::order_retry_strategy::{OrderRetryStrategy, RetryConfig};
use hope::application::risk_management::order_throttler::TokenBucket;
use hope::application::system::shutdown::ShutdownHandle;
use hope::domain::decision::{Action, Decision, SignalTier};
use hope::domain::events::EventEnvelope;
use hope::domain::order::{Order, OrderSide};
use hope::domain::ports::{AccountBalances, ExchangeRest, OrderBookTop, OrderFill};
use hope::domain::repositories::EventRepository;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

struct SlowExchange {
    in_flight: Arc<AtomicUsize>,
    max_observed: Arc<AtomicUsize>,
}

#[async_trait]
impl ExchangeRest for SlowExchange {
    async fn place_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: &str) -> anyhow::Result<OrderFill> {
        unreachable!()
    }

    async fn place_ioc_limit_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        _client_order_id: &str,
    ) -> anyhow::Result<Option<OrderFill>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(OrderFill { avg_price: price, filled_quantity: quantity }))
    }

    async fn place_oco_exit(&self, _: &str, _: Decimal, _: Decimal, _: Decimal, _: Decimal, _: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cancel_order(&self, _: &str, _: &str) -> anyhow::Result<()> {
        unreachable!()
    }

    async fn order_book_top(&self, _: &str) -> anyhow::Result<OrderBookTop> {
        Ok(OrderBookTop { best_bid: dec!(100), best_ask: dec!(100.1) })
    }

    async fn account_balances(&self) -> anyhow::Result<AccountBalances> {
        unreachable!()
    }

    async fn open_orders(&self, _: &[String]) -> anyhow::Result<Vec<Order>> {
        Ok(vec![])
    }

    async fn exchange_info_24h_volume(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        unreachable!()
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

fn sample_decision(symbol: &str) -> Decision {
    Decision {
        schema_version: 1,
        correlation_id: format!("corr-{symbol}"),
        symbol: symbol.to_string(),
        alpha_confidence: 0.8,
        risk_approved: true,
        risk_reasons: vec![],
        action: Action::Buy,
        confidence: 0.8,
        entry_price_hint: dec!(100),
        position_size_usd: dec!(1000),
        tp_pct: dec!(3),
        sl_pct: dec!(1),
        timeout_sec: 3600,
        signal_tier: SignalTier::Strong,
        skip_reasons: vec![],
    }
}

#[tokio::test]
async fn concurrent_entries_never_exceed_the_configured_pool_size() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));
    let exchange = Arc::new(SlowExchange { in_flight: in_flight.clone(), max_observed: max_observed.clone() });

    let book = PositionBook::new();
    let (outcome_tx, _outcome_rx) = mpsc::channel(8);

    let executor = OrderExecutor::new(
        ExecutorConfig { pool_size: 2, ..ExecutorConfig::default() },
        exchange,
        OrderRetryStrategy::new(RetryConfig::default()),
        TokenBucket::new(1_000),
        Arc::new(NoopEventRepository),
        book.clone(),
        outcome_tx,
        hope::infrastructure::observability::Metrics::new(),
    );

    let gate = executor.load_gate();
    assert_eq!(gate.available_permits(), 2);

    let (buy_tx, buy_rx) = mpsc::channel(8);
    let (_exit_tx, exit_rx) = mpsc::channel(8);

    for symbol in ["AAAUSDT", "BBBUSDT", "CCCUSDT", "DDDUSDT", "EEEUSDT"] {
        buy_tx.send(sample_decision(symbol)).await.unwrap();
    }
    drop(buy_tx);

    let (_shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    let run_handle = tokio::spawn(executor.run(buy_rx, exit_rx, shutdown_signal));
    tokio::time::sleep(Duration::from_millis(500)).await;
    run_handle.abort();

    assert_eq!(max_observed.load(Ordering::SeqCst), 2, "pool of size 2 must never run more than 2 entries at once");
    assert_eq!(book.count().await, 5, "every decision should have opened a position once its turn came");
    assert_eq!(gate.available_permits(), 2, "all permits must be returned once every task finishes");
}
