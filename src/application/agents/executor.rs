//! Order Executor: submits entries and exits to the exchange (spec §4.7).
//! Entries arrive as BUY `Decision`s from the Decision Engine; exits arrive
//! as `ExitRequest`s from the Watchdog or Outcome Tracker. Every client
//! order id is derived deterministically from a correlation id so retries
//! are idempotent. Each decision/exit is handled on its own spawned task,
//! bounded by a semaphore so a slow exchange call never blocks the rest of
//! the book from being worked.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::application::agents::outcome_tracker::ClosedPosition;
use crate::application::agents::position_tracker::PositionBook;
use crate::application::agents::watchdog::ExitRequest;
use crate::application::risk_management::order_retry_strategy::OrderRetryStrategy;
use crate::application::risk_management::order_throttler::TokenBucket;
use crate::application::risk_management::target_engine::{TargetEngine, Targets};
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::decision::Decision;
use crate::domain::errors::ExecutionError;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::ids;
use crate::domain::order::OrderSide;
use crate::domain::ports::{ExchangeRest, OrderFill};
use crate::domain::position::Position;
use crate::domain::repositories::EventRepository;
use crate::infrastructure::observability::Metrics;

const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub max_cross_pct: Decimal,
    pub ioc_wait: Duration,
    pub pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_cross_pct: dec!(0.3), ioc_wait: Duration::from_secs(2), pool_size: DEFAULT_POOL_SIZE }
    }
}

/// State shared by every concurrently-spawned order-handling task. Held
/// behind `Arc` rather than owned by `OrderExecutor` directly so `run` can
/// consume `self` and still hand clones out to spawned tasks.
struct ExecutorInner {
    config: ExecutorConfig,
    exchange: Arc<dyn ExchangeRest>,
    retry: OrderRetryStrategy,
    throttle: Mutex<TokenBucket>,
    event_repo: Arc<dyn EventRepository>,
    book: PositionBook,
    outcome_tx: mpsc::Sender<ClosedPosition>,
    metrics: Metrics,
}

pub struct OrderExecutor {
    inner: Arc<ExecutorInner>,
    semaphore: Arc<Semaphore>,
}

impl OrderExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutorConfig,
        exchange: Arc<dyn ExchangeRest>,
        retry: OrderRetryStrategy,
        throttle: TokenBucket,
        event_repo: Arc<dyn EventRepository>,
        book: PositionBook,
        outcome_tx: mpsc::Sender<ClosedPosition>,
        metrics: Metrics,
    ) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                exchange,
                retry,
                throttle: Mutex::new(throttle),
                event_repo,
                book,
                outcome_tx,
                metrics,
            }),
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }
    }

    /// A clone of the pool's permit gate, handed to the Decision Engine so it
    /// can tell pool saturation apart from every other risk veto.
    pub fn load_gate(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }

    pub async fn run(
        self,
        mut buy_rx: mpsc::Receiver<Decision>,
        mut exit_rx: mpsc::Receiver<ExitRequest>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                Some(decision) = buy_rx.recv() => {
                    self.spawn_buy(decision);
                }
                Some(exit) = exit_rx.recv() => {
                    self.spawn_exit(exit);
                }
                _ = shutdown.triggered() => {
                    warn!("order executor stopping on shutdown signal, in-flight tasks left to finish on their own");
                    break;
                }
                else => break,
            }
        }
    }

    fn spawn_buy(&self, decision: Decision) {
        let inner = self.inner.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else { return };
            handle_buy(&inner, decision).await;
        });
    }

    fn spawn_exit(&self, exit: ExitRequest) {
        let inner = self.inner.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else { return };
            handle_exit(&inner, exit).await;
        });
    }
}

#[instrument(skip(inner, decision), fields(symbol = %decision.symbol, correlation_id = %decision.correlation_id))]
async fn handle_buy(inner: &ExecutorInner, decision: Decision) {
    inner.metrics.record_order_submitted();
    let client_order_id = ids::client_order_id(&decision.correlation_id, "entry");

    let book_top = match inner.exchange.order_book_top(&decision.symbol).await {
        Ok(top) => top,
        Err(e) => {
            warn!("failed to fetch orderbook, aborting entry: {}", e);
            publish_rejected(inner, &decision, &client_order_id, &e.to_string()).await;
            return;
        }
    };

    let max_price = decision.entry_price_hint * (Decimal::ONE + inner.config.max_cross_pct / dec!(100));
    let limit_price = book_top.best_bid.min(max_price);
    let quantity = decision.position_size_usd / limit_price;

    let exchange = inner.exchange.clone();
    let fill = match submit_with_retry(&inner.retry, &inner.throttle, || {
        let exchange = exchange.clone();
        let symbol = decision.symbol.clone();
        let client_order_id = client_order_id.clone();
        Box::pin(async move {
            exchange
                .place_ioc_limit_order(&symbol, OrderSide::Buy, quantity, limit_price, &client_order_id)
                .await
        })
    })
    .await
    {
        Ok(Some(fill)) => fill,
        Ok(None) => {
            // IOC didn't cross; fall back to MARKET (spec §4.7 step 2).
            tokio::time::sleep(inner.config.ioc_wait).await;
            let market_client_order_id = ids::client_order_id(&decision.correlation_id, "entry-market");
            let exchange = inner.exchange.clone();
            match submit_with_retry(&inner.retry, &inner.throttle, || {
                let exchange = exchange.clone();
                let symbol = decision.symbol.clone();
                let client_order_id = market_client_order_id.clone();
                Box::pin(async move {
                    exchange
                        .place_market_order(&symbol, OrderSide::Buy, quantity, &client_order_id)
                        .await
                        .map(Some)
                })
            })
            .await
            {
                Ok(Some(fill)) => fill,
                Ok(None) => return,
                Err(e) => {
                    publish_rejected(inner, &decision, &market_client_order_id, &e.to_string()).await;
                    return;
                }
            }
        }
        Err(e) => {
            publish_rejected(inner, &decision, &client_order_id, &e.to_string()).await;
            return;
        }
    };

    publish_filled(inner, &decision, &client_order_id, fill.avg_price, fill.filled_quantity).await;

    let targets = Targets { tp_pct: decision.tp_pct, sl_pct: decision.sl_pct };
    let (tp_price, sl_price) = TargetEngine::to_prices(fill.avg_price, targets);

    let tp_client_order_id = ids::client_order_id(&decision.correlation_id, "tp");
    let sl_stop_limit_price = sl_price * dec!(0.999);
    if let Err(e) = inner
        .exchange
        .place_oco_exit(&decision.symbol, fill.filled_quantity, tp_price, sl_price, sl_stop_limit_price, &tp_client_order_id)
        .await
    {
        error!("failed to place OCO exit for {}: {}", decision.symbol, e);
    }

    let position = Position {
        schema_version: 1,
        id: ids::client_order_id(&decision.correlation_id, "position"),
        correlation_id: decision.correlation_id.clone(),
        symbol: decision.symbol.clone(),
        entry_order_id: client_order_id.clone(),
        entry_price: fill.avg_price,
        quantity: fill.filled_quantity,
        remaining_quantity: fill.filled_quantity,
        tp_price,
        sl_price,
        trailing_stop_price: None,
        highest_price_seen: fill.avg_price,
        lowest_price_seen: fill.avg_price,
        partial_tp_taken: false,
        opened_at: ids::now(),
        timeout_at: ids::now() + chrono::Duration::seconds(decision.timeout_sec as i64),
    };
    inner.book.insert(position.clone()).await;

    if let Ok(envelope) = EventEnvelope::new(&decision.correlation_id, Some(&decision.symbol), EventPayload::PositionOpened { position }) {
        let _ = inner.event_repo.append(&envelope).await;
    }
}

#[instrument(skip(inner, exit), fields(symbol = %exit.symbol, position_id = %exit.position_id))]
async fn handle_exit(inner: &ExecutorInner, exit: ExitRequest) {
    let Some(position) = inner.book.get(&exit.position_id).await else {
        warn!("exit request for unknown position {}, ignoring", exit.position_id);
        return;
    };

    let client_order_id = ids::client_order_id(&position.correlation_id, &format!("exit-{:?}", exit.reason).to_lowercase());

    if !exit.force_market {
        // TP/SL/TRAILING exits are already covered by the standing OCO
        // order on the exchange; only TIMEOUT, PARTIAL_TP and panic
        // exits need an executor-initiated MARKET sell.
        if matches!(exit.reason, crate::domain::position::ExitReason::TakeProfit | crate::domain::position::ExitReason::StopLoss) {
            return;
        }
    }

    let exchange = inner.exchange.clone();
    let result = submit_with_retry(&inner.retry, &inner.throttle, || {
        let exchange = exchange.clone();
        let symbol = exit.symbol.clone();
        let quantity = exit.quantity;
        let client_order_id = client_order_id.clone();
        Box::pin(async move {
            exchange
                .place_market_order(&symbol, OrderSide::Sell, quantity, &client_order_id)
                .await
                .map(Some)
        })
    })
    .await;

    match result {
        Ok(Some(fill)) => {
            info!("exit filled for {} at {}", position.symbol, fill.avg_price);
            if matches!(exit.reason, crate::domain::position::ExitReason::PartialTakeProfit) {
                let mut updated = position.clone();
                updated.apply_partial_take_profit(fill.filled_quantity);
                inner.book.update(updated).await;
            } else {
                inner.book.remove(&exit.position_id).await;
                if let Ok(envelope) = EventEnvelope::new(
                    &position.correlation_id,
                    Some(&position.symbol),
                    EventPayload::PositionClosed {
                        position_id: position.id.clone(),
                        symbol: position.symbol.clone(),
                        reason: exit.reason,
                        pnl_usd: (fill.avg_price - position.entry_price) * fill.filled_quantity,
                    },
                ) {
                    let _ = inner.event_repo.append(&envelope).await;
                }
                let closed = ClosedPosition {
                    position: position.clone(),
                    exit_reason: exit.reason,
                    fill_price: fill.avg_price,
                    closed_at: ids::now(),
                };
                if inner.outcome_tx.send(closed).await.is_err() {
                    warn!("outcome tracker channel closed, dropping closed position");
                }
            }
        }
        Ok(None) => {}
        Err(e) => error!("exit order failed for {}: {}", position.symbol, e),
    }
}

async fn publish_rejected(inner: &ExecutorInner, decision: &Decision, client_order_id: &str, reason: &str) {
    inner.metrics.record_order_rejected();
    warn!("order rejected for {}: {}", decision.symbol, reason);
    if let Ok(envelope) = EventEnvelope::new(
        &decision.correlation_id,
        Some(&decision.symbol),
        EventPayload::OrderRejected {
            order_id: client_order_id.to_string(),
            symbol: decision.symbol.clone(),
            reason: reason.to_string(),
        },
    ) {
        let _ = inner.event_repo.append(&envelope).await;
    }
}

async fn publish_filled(inner: &ExecutorInner, decision: &Decision, client_order_id: &str, fill_price: Decimal, quantity: Decimal) {
    inner.metrics.record_order_filled();
    if let Ok(envelope) = EventEnvelope::new(
        &decision.correlation_id,
        Some(&decision.symbol),
        EventPayload::OrderFilled {
            order_id: client_order_id.to_string(),
            symbol: decision.symbol.clone(),
            fill_price,
            quantity,
        },
    ) {
        let _ = inner.event_repo.append(&envelope).await;
    }
}

/// Drives one logical order submission through the throttle and the retry
/// policy. A free function so its closure argument can capture a
/// pre-cloned `exchange` handle without fighting the borrow checker.
async fn submit_with_retry<F>(
    retry: &OrderRetryStrategy,
    throttle: &Mutex<TokenBucket>,
    mut make_call: F,
) -> anyhow::Result<Option<OrderFill>>
where
    F: FnMut() -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<Option<OrderFill>>> + Send>>,
{
    let mut attempt = 0u32;
    loop {
        loop {
            let acquired = throttle.lock().await.try_acquire();
            if acquired {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        match make_call().await {
            Ok(fill) => return Ok(fill),
            Err(e) => {
                let classified = classify_error(&e);
                match retry.next_delay(attempt, &classified) {
                    Some(delay) => {
                        warn!("order submission attempt {} failed, retrying in {:?}: {}", attempt, delay, classified);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}

/// Classifies an opaque exchange-adapter error into the retry taxonomy
/// (spec §4.7 Retry policy). The adapter layer only has `anyhow::Error` to
/// give us, so this leans on message text the Binance REST client
/// populates consistently for these categories.
fn classify_error(err: &anyhow::Error) -> ExecutionError {
    let msg = err.to_string().to_lowercase();
    if msg.contains("insufficient") || msg.contains("invalid_symbol") || msg.contains("invalid symbol") || msg.contains("notional") || msg.contains("min_notional") {
        ExecutionError::Permanent(err.to_string())
    } else if msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests") {
        ExecutionError::RateLimit(err.to_string())
    } else {
        ExecutionError::Transient(err.to_string())
    }
}
