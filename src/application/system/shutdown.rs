//! Graceful shutdown sequence: flatten positions (if enabled), cancel
//! standing exchange orders, then log final risk/position state. Triggered
//! once, from the Ctrl+C handler registered in `Application::start`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::application::agents::position_tracker::PositionBook;
use crate::application::risk_management::risk_state_manager::RiskStateManager;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::ids;
use crate::domain::order::OrderSide;
use crate::domain::ports::{ExchangeRest, Notifier};
use crate::domain::repositories::EventRepository;

/// Every spawned loop waits on its own clone of the up-to-10s grace window
/// an in-flight exchange call gets before the process tears down around it
/// (spec §5).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Broadcasts the single process-wide "stop" transition. There is no
/// `trigger()`-and-forget here; every loop holds a `ShutdownSignal` clone
/// and checks it in its own `tokio::select!`, so the signal has to exist
/// before any loop is spawned.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Idempotent: a second call is a no-op since the channel is already at
    /// `true` and every receiver has already observed it.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once, the first time the signal flips to `true`. Meant as a
    /// `tokio::select!` branch alongside a loop's real channel receives.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShutdownConfig {
    pub flatten_on_exit: bool,
}

pub struct ShutdownSequence {
    exchange: Arc<dyn ExchangeRest>,
    book: PositionBook,
    risk: Arc<RwLock<RiskStateManager>>,
    symbols: Vec<String>,
    config: ShutdownConfig,
    notifier: Arc<dyn Notifier>,
    event_repo: Arc<dyn EventRepository>,
}

impl ShutdownSequence {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangeRest>,
        book: PositionBook,
        risk: Arc<RwLock<RiskStateManager>>,
        symbols: Vec<String>,
        config: ShutdownConfig,
        notifier: Arc<dyn Notifier>,
        event_repo: Arc<dyn EventRepository>,
    ) -> Self {
        Self { exchange, book, risk, symbols, config, notifier, event_repo }
    }

    pub async fn run(&self) {
        info!("shutdown sequence starting");
        let reason = "operator or signal requested shutdown";
        if let Err(e) = self.notifier.notify("shutdown sequence starting", reason).await {
            warn!("failed to send shutdown notification: {}", e);
        }
        self.emit(EventPayload::GracefulStopInitiated { reason: reason.to_string() }).await;

        if self.config.flatten_on_exit {
            self.flatten_positions().await;
        } else {
            info!("flatten_on_exit disabled, open positions left standing");
        }

        self.cancel_open_orders().await;

        let open_positions = self.book.count().await;
        let risk = self.risk.read().await;
        info!(
            open_positions,
            daily_pnl_usd = %risk.state().daily_pnl_usd,
            consecutive_losses = risk.state().consecutive_losses,
            "shutdown sequence complete"
        );
    }

    async fn emit(&self, payload: EventPayload) {
        match EventEnvelope::new("shutdown", None, payload) {
            Ok(envelope) => {
                if let Err(e) = self.event_repo.append(&envelope).await {
                    warn!("failed to append shutdown event: {}", e);
                }
            }
            Err(e) => warn!("failed to build shutdown event envelope: {}", e),
        }
    }

    async fn flatten_positions(&self) {
        let positions = self.book.all().await;
        if positions.is_empty() {
            info!("no open positions to flatten");
            return;
        }
        info!("flattening {} open position(s)", positions.len());
        for position in positions {
            let client_order_id = ids::client_order_id(&position.correlation_id, "shutdown-flatten");
            let call = self.exchange.place_market_order(&position.symbol, OrderSide::Sell, position.remaining_quantity, &client_order_id);
            match tokio::time::timeout(SHUTDOWN_GRACE, call).await {
                Ok(Ok(fill)) => {
                    info!(symbol = %position.symbol, fill_price = %fill.avg_price, "position flattened on shutdown");
                    self.book.remove(&position.id).await;
                }
                Ok(Err(e)) => error!(symbol = %position.symbol, "failed to flatten position on shutdown: {}", e),
                Err(_) => {
                    warn!(symbol = %position.symbol, "flatten order outcome uncertain, exchange call did not return within the shutdown grace window");
                    self.emit(EventPayload::UncertainOutcome {
                        symbol: position.symbol.clone(),
                        operation: "flatten".to_string(),
                        detail: format!("no response within {:?}", SHUTDOWN_GRACE),
                    })
                    .await;
                }
            }
        }
    }

    async fn cancel_open_orders(&self) {
        let open_orders = match tokio::time::timeout(SHUTDOWN_GRACE, self.exchange.open_orders(&self.symbols)).await {
            Ok(Ok(orders)) => orders,
            Ok(Err(e)) => {
                warn!("failed to fetch open orders during shutdown: {}", e);
                return;
            }
            Err(_) => {
                warn!("open orders lookup did not return within the shutdown grace window, skipping cancellation pass");
                self.emit(EventPayload::UncertainOutcome {
                    symbol: "*".to_string(),
                    operation: "open_orders".to_string(),
                    detail: format!("no response within {:?}", SHUTDOWN_GRACE),
                })
                .await;
                return;
            }
        };
        if open_orders.is_empty() {
            info!("no open orders to cancel");
            return;
        }
        info!("cancelling {} open order(s)", open_orders.len());
        for order in open_orders {
            let call = self.exchange.cancel_order(&order.symbol, &order.client_order_id);
            match tokio::time::timeout(SHUTDOWN_GRACE, call).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(symbol = %order.symbol, "failed to cancel order {} during shutdown: {}", order.client_order_id, e),
                Err(_) => {
                    warn!(symbol = %order.symbol, "cancel outcome uncertain for order {}, exchange call did not return within the shutdown grace window", order.client_order_id);
                    self.emit(EventPayload::UncertainOutcome {
                        symbol: order.symbol.clone(),
                        operation: "cancel".to_string(),
                        detail: format!("no response within {:?}", SHUTDOWN_GRACE),
                    })
                    .await;
                }
            }
        }
    }
}
