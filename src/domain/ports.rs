//! Port interfaces: traits the application layer depends on, implemented by
//! infrastructure adapters. Kept here (not in `infrastructure`) so the
//! application layer never names a concrete adapter type.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::order::{Order, OrderSide};

#[derive(Debug, Clone, Copy)]
pub struct OrderFill {
    pub filled_quantity: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct AccountBalances {
    pub quote_asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl AccountBalances {
    pub fn equity(&self) -> Decimal {
        self.free + self.locked
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBookTop {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

/// Exchange trading & account surface (spec §4.7, §4.10). Grounded on the
/// Binance execution adapter's retry/signing pattern; this trait is what
/// lets the Order Executor and Position Tracker stay exchange-agnostic.
#[async_trait]
pub trait ExchangeRest: Send + Sync {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderFill>;

    async fn place_ioc_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
        client_order_id: &str,
    ) -> Result<Option<OrderFill>>;

    async fn place_oco_exit(
        &self,
        symbol: &str,
        quantity: Decimal,
        take_profit_price: Decimal,
        stop_price: Decimal,
        stop_limit_price: Decimal,
        client_order_id: &str,
    ) -> Result<()>;

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<()>;

    async fn order_book_top(&self, symbol: &str) -> Result<OrderBookTop>;

    async fn account_balances(&self) -> Result<AccountBalances>;

    /// Exchange's current view of open orders/positions for `symbols`, used
    /// by Startup & Reconciliation (spec §4.14) to detect ghost/orphan state.
    async fn open_orders(&self, symbols: &[String]) -> Result<Vec<Order>>;

    async fn exchange_info_24h_volume(&self) -> Result<HashMap<String, Decimal>>;
}

/// Streaming market-data feed. The connection loop lives in infrastructure;
/// the application layer only ever calls `Get` against the Price Cache that
/// this feed writes into, so this trait exists purely to let bootstrap wire
/// the feed to the cache without naming the websocket adapter.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn run(&self, symbols: Vec<String>, on_tick: tokio::sync::mpsc::Sender<PriceTick>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub exchange_time: chrono::DateTime<chrono::Utc>,
}

/// Pre-trained signal classifier consumed at inference time only (spec
/// §4.6, §B.6 registry verification). `Score` never trains; weights are
/// loaded once at startup after a SHA-256 registry check.
pub trait SignalClassifier: Send + Sync {
    fn score(&self, features: &[f32]) -> Result<f32>;
}

/// Sentiment/fundamental adjustment collaborator (spec §4.6c). Defaults to
/// 0.5 when unavailable; implementations should prefer returning `Ok(0.5)`
/// over propagating a transient failure up through the Alpha Chamber.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn adjustment(&self, symbol: &str) -> Result<f64>;
}

/// Historical OHLC collaborator feeding ATR-based target computation
/// (spec §4.6 Targets).
#[async_trait]
pub trait PriceHistory: Send + Sync {
    async fn recent_candles(&self, symbol: &str, n: usize) -> Result<Vec<Candle>>;
}

#[derive(Debug, Clone, Copy)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Outbound operator notifications (circuit trips, kill-switch, panic
/// exits). Best-effort; failures are logged, never fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Secret material access, isolated behind a trait so that `Config` never
/// holds raw API keys longer than it takes to hand them to the adapter that
/// needs them.
pub trait SecretsProvider: Send + Sync {
    fn exchange_api_key(&self) -> Result<String>;
    fn exchange_api_secret(&self) -> Result<String>;
}
