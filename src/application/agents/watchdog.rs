//! Position Watchdog: independent 1s loop over every open position (spec
//! §4.9). Decides exits from the Price Cache alone and hands the decision
//! back to the Order Executor as an `ExitRequest`; never submits to the
//! exchange itself.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::agents::position_tracker::PositionBook;
use crate::application::market_data::price_cache::PriceCache;
use crate::application::monitoring::connection_health_service::ConnectionHealthService;
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::ports::{ExchangeRest, Notifier};
use crate::domain::position::ExitReason;

const EXCHANGE_REST_FEED: &str = "exchange_rest";

#[derive(Debug, Clone)]
pub struct ExitRequest {
    pub position_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub reason: ExitReason,
    /// Panic exits always force a MARKET order regardless of configured
    /// exit method (spec §4.9).
    pub force_market: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    pub trail_activation_pct: Decimal,
    pub trail_distance_pct: Decimal,
    pub partial_tp_pct: Decimal,
    pub stale_panic_after: chrono::Duration,
    pub api_silence_panic_after: chrono::Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            trail_activation_pct: dec!(1.0),
            trail_distance_pct: dec!(0.5),
            partial_tp_pct: dec!(1.5),
            stale_panic_after: chrono::Duration::seconds(30),
            api_silence_panic_after: chrono::Duration::seconds(60),
        }
    }
}

pub struct Watchdog {
    config: WatchdogConfig,
    book: PositionBook,
    price_cache: PriceCache,
    exchange: Arc<dyn ExchangeRest>,
    notifier: Arc<dyn Notifier>,
    connection_health: ConnectionHealthService,
    last_reachable_at: chrono::DateTime<chrono::Utc>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        book: PositionBook,
        price_cache: PriceCache,
        exchange: Arc<dyn ExchangeRest>,
        notifier: Arc<dyn Notifier>,
        connection_health: ConnectionHealthService,
    ) -> Self {
        Self { config, book, price_cache, exchange, notifier, connection_health, last_reachable_at: crate::domain::ids::now() }
    }

    pub async fn run(mut self, exit_tx: mpsc::Sender<ExitRequest>, mut period: tokio::time::Interval, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = period.tick() => {
                    self.tick(&exit_tx).await;
                }
                _ = shutdown.triggered() => {
                    warn!("watchdog stopping on shutdown signal");
                    break;
                }
            }
        }
    }

    async fn tick(&mut self, exit_tx: &mpsc::Sender<ExitRequest>) {
        let now = crate::domain::ids::now();

        let api_silent = match self.exchange.account_balances().await {
            Ok(_) => {
                self.last_reachable_at = now;
                self.connection_health.record_success(EXCHANGE_REST_FEED, now).await;
                false
            }
            Err(e) => {
                warn!("watchdog: exchange reachability check failed: {}", e);
                self.connection_health.record_failure(EXCHANGE_REST_FEED, now).await;
                now - self.last_reachable_at > self.config.api_silence_panic_after
            }
        };

        for mut position in self.book.all().await {
            if api_silent {
                self.emit(exit_tx, &position, ExitReason::PanicApiSilent, true).await;
                continue;
            }

            let snapshot = self.price_cache.get(&position.symbol, now).await;
            let stale_for = match &snapshot {
                Some(s) => s.age,
                None => chrono::Duration::days(3650),
            };
            if stale_for > self.config.stale_panic_after {
                self.emit(exit_tx, &position, ExitReason::PanicStalePrice, true).await;
                continue;
            }
            let price = match snapshot {
                Some(s) => s.price,
                None => continue,
            };

            if position.is_timed_out(now) {
                self.emit(exit_tx, &position, ExitReason::Timeout, false).await;
                continue;
            }
            if price >= position.tp_price {
                self.emit(exit_tx, &position, ExitReason::TakeProfit, false).await;
                continue;
            }
            if price <= position.sl_price {
                self.emit(exit_tx, &position, ExitReason::StopLoss, false).await;
                continue;
            }

            let mut changed = position.update_high_water_mark(price);
            changed |= position.update_low_water_mark(price);

            if !position.partial_tp_taken && position.unrealized_pnl_pct(price) >= self.config.partial_tp_pct {
                position.partial_tp_taken = true;
                changed = true;
                let half = position.remaining_quantity / Decimal::TWO;
                self.emit_partial(exit_tx, &position, half).await;
            }

            let activation_price = position.entry_price * (Decimal::ONE + self.config.trail_activation_pct / dec!(100));
            if position.highest_price_seen >= activation_price {
                let candidate = position.highest_price_seen * (Decimal::ONE - self.config.trail_distance_pct / dec!(100));
                let before = position.trailing_stop_price;
                position.ratchet_trailing_stop(candidate);
                if position.trailing_stop_price != before {
                    changed = true;
                }
                if let Some(trail) = position.trailing_stop_price
                    && price <= trail
                {
                    self.emit(exit_tx, &position, ExitReason::TrailingStop, false).await;
                    continue;
                }
            }

            if changed {
                self.book.update(position).await;
            }
        }
    }

    async fn emit(&self, exit_tx: &mpsc::Sender<ExitRequest>, position: &crate::domain::position::Position, reason: ExitReason, force_market: bool) {
        info!(symbol = %position.symbol, position_id = %position.id, ?reason, "watchdog: exit triggered");
        if force_market {
            let body = format!("panic exit: {reason:?} on {} (position {})", position.symbol, position.id);
            if let Err(e) = self.notifier.notify("watchdog panic exit", &body).await {
                warn!("failed to send panic exit notification: {}", e);
            }
        }
        let request = ExitRequest {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            quantity: position.remaining_quantity,
            reason,
            force_market,
        };
        if exit_tx.send(request).await.is_err() {
            warn!("order executor exit channel closed, dropping exit request");
        }
    }

    async fn emit_partial(&self, exit_tx: &mpsc::Sender<ExitRequest>, position: &crate::domain::position::Position, half_qty: Decimal) {
        info!(symbol = %position.symbol, position_id = %position.id, "watchdog: partial take-profit triggered");
        let request = ExitRequest {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            quantity: half_qty,
            reason: ExitReason::PartialTakeProfit,
            force_market: false,
        };
        if exit_tx.send(request).await.is_err() {
            warn!("order executor exit channel closed, dropping partial take-profit request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderSide};
    use crate::domain::ports::{AccountBalances, OrderBookTop, OrderFill};
    use crate::domain::position::Position;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct ReachableExchange;

    struct UnreachableExchange;

    struct NoopNotifier;

    #[async_trait]
    impl Notifier for NoopNotifier {
        async fn notify(&self, _subject: &str, _body: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ExchangeRest for UnreachableExchange {
        async fn place_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: &str) -> anyhow::Result<OrderFill> {
            unreachable!("watchdog never places orders itself")
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
            anyhow::bail!("exchange unreachable")
        }
        async fn open_orders(&self, _: &[String]) -> anyhow::Result<Vec<Order>> {
            Ok(vec![])
        }
        async fn exchange_info_24h_volume(&self) -> anyhow::Result<std::collections::HashMap<String, Decimal>> {
            Ok(std::collections::HashMap::new())
        }
    }

    #[async_trait]
    impl ExchangeRest for ReachableExchange {
        async fn place_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: &str) -> anyhow::Result<OrderFill> {
            unreachable!("watchdog never places orders itself")
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
            Ok(AccountBalances { quote_asset: "USDT".into(), free: dec!(10_000), locked: dec!(0) })
        }
        async fn open_orders(&self, _: &[String]) -> anyhow::Result<Vec<Order>> {
            Ok(vec![])
        }
        async fn exchange_info_24h_volume(&self) -> anyhow::Result<std::collections::HashMap<String, Decimal>> {
            Ok(std::collections::HashMap::new())
        }
    }

    fn sample_position() -> Position {
        Position {
            schema_version: 1,
            id: "pos-1".into(),
            correlation_id: "corr-1".into(),
            symbol: "ABCUSDT".into(),
            entry_order_id: "o-1".into(),
            entry_price: dec!(10),
            quantity: dec!(100),
            remaining_quantity: dec!(100),
            tp_price: dec!(12.5),
            sl_price: dec!(9),
            trailing_stop_price: None,
            highest_price_seen: dec!(10),
            lowest_price_seen: dec!(10),
            partial_tp_taken: false,
            opened_at: crate::domain::ids::now(),
            timeout_at: crate::domain::ids::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn stale_price_triggers_forced_panic_exit() {
        let book = PositionBook::new();
        book.insert(sample_position()).await;
        let price_cache = PriceCache::new();
        // A tick 35s old: Price Feed suspended, no fresh tick recorded since.
        let stale_time = crate::domain::ids::now() - chrono::Duration::seconds(35);
        price_cache.record_tick("ABCUSDT", dec!(10), stale_time).await;

        let mut watchdog =
            Watchdog::new(WatchdogConfig::default(), book, price_cache, Arc::new(ReachableExchange), Arc::new(NoopNotifier), ConnectionHealthService::new());
        let (exit_tx, mut exit_rx) = mpsc::channel(4);
        watchdog.tick(&exit_tx).await;

        let request = exit_rx.try_recv().expect("expected a panic exit request");
        assert_eq!(request.symbol, "ABCUSDT");
        assert_eq!(request.reason, ExitReason::PanicStalePrice);
        assert!(request.force_market);
    }

    #[tokio::test]
    async fn unreachable_exchange_triggers_api_silence_panic_exit() {
        let book = PositionBook::new();
        book.insert(sample_position()).await;
        let price_cache = PriceCache::new();
        price_cache.record_tick("ABCUSDT", dec!(10), crate::domain::ids::now()).await;

        let mut watchdog =
            Watchdog::new(WatchdogConfig::default(), book, price_cache, Arc::new(UnreachableExchange), Arc::new(NoopNotifier), ConnectionHealthService::new());
        // Backdate the last-reachable clock past the silence threshold so a
        // single failed reachability check is enough to trip the panic exit.
        watchdog.last_reachable_at = crate::domain::ids::now() - chrono::Duration::seconds(61);
        let (exit_tx, mut exit_rx) = mpsc::channel(4);
        watchdog.tick(&exit_tx).await;

        let request = exit_rx.try_recv().expect("expected an api-silence panic exit request");
        assert_eq!(request.symbol, "ABCUSDT");
        assert_eq!(request.reason, ExitReason::PanicApiSilent);
        assert!(request.force_market);
    }

    #[tokio::test]
    async fn fresh_price_between_targets_triggers_no_exit() {
        let book = PositionBook::new();
        book.insert(sample_position()).await;
        let price_cache = PriceCache::new();
        price_cache.record_tick("ABCUSDT", dec!(10.05), crate::domain::ids::now()).await;

        let mut watchdog =
            Watchdog::new(WatchdogConfig::default(), book, price_cache, Arc::new(ReachableExchange), Arc::new(NoopNotifier), ConnectionHealthService::new());
        let (exit_tx, mut exit_rx) = mpsc::channel(4);
        watchdog.tick(&exit_tx).await;

        assert!(exit_rx.try_recv().is_err());
    }
}
