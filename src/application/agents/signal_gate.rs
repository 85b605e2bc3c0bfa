//! Signal Gate: seven guards evaluated in order, first failure blocks
//! (spec §4.5). Runs as an independent loop fed by the Signal Source
//! collaborator; forwards passed signals to the Decision Engine and always
//! emits a `GateResult` event.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::application::market_data::allow_list_service::AllowListService;
use crate::application::market_data::price_cache::PriceCache;
use crate::application::risk_management::circuit_breaker_service::CircuitState;
use crate::application::risk_management::order_throttler::TokenBucket;
use crate::application::risk_management::pending_orders_tracker::PendingOrdersTracker;
use crate::application::risk_management::risk_state_manager::RiskStateManager;
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::errors::GateError;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::gate::GateResult;
use crate::domain::repositories::EventRepository;
use crate::domain::signal::Signal;
use crate::infrastructure::observability::Metrics;

#[derive(Debug, Clone)]
pub struct SignalGateConfig {
    pub ttl: chrono::Duration,
    pub min_daily_volume_usd: Decimal,
    pub price_tolerance_pct: Decimal,
    pub blacklist: HashSet<String>,
}

pub struct SignalGate {
    config: SignalGateConfig,
    price_cache: PriceCache,
    allow_list: Arc<AllowListService>,
    risk: Arc<tokio::sync::RwLock<RiskStateManager>>,
    event_repo: Arc<dyn EventRepository>,
    rate_bucket: TokenBucket,
    pending: PendingOrdersTracker,
    metrics: Metrics,
}

impl SignalGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SignalGateConfig,
        price_cache: PriceCache,
        allow_list: Arc<AllowListService>,
        risk: Arc<tokio::sync::RwLock<RiskStateManager>>,
        event_repo: Arc<dyn EventRepository>,
        signals_per_sec: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            price_cache,
            allow_list,
            risk,
            event_repo,
            rate_bucket: TokenBucket::new(signals_per_sec),
            pending: PendingOrdersTracker::new(),
            metrics,
        }
    }

    pub async fn run(
        mut self,
        mut signal_rx: mpsc::Receiver<Signal>,
        passed_tx: mpsc::Sender<Signal>,
        circuit_state: Arc<tokio::sync::RwLock<CircuitState>>,
        mut cleared_rx: mpsc::Receiver<String>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                Some(signal) = signal_rx.recv() => {
                    self.handle_signal(signal, &passed_tx, &circuit_state).await;
                }
                Some(symbol) = cleared_rx.recv() => {
                    self.pending.clear(&symbol);
                }
                _ = shutdown.triggered() => {
                    warn!("signal gate stopping on shutdown signal");
                    break;
                }
                else => break,
            }
        }
    }

    #[instrument(skip(self, signal, passed_tx, circuit_state), fields(symbol = %signal.symbol, correlation_id = %signal.correlation_id))]
    async fn handle_signal(
        &mut self,
        signal: Signal,
        passed_tx: &mpsc::Sender<Signal>,
        circuit_state: &Arc<tokio::sync::RwLock<CircuitState>>,
    ) {
        let now = crate::domain::ids::now();
        let result = self.evaluate(&signal, now, circuit_state).await;

        self.metrics.record_signal_processed();
        if !result.is_pass() {
            self.metrics.record_signal_blocked();
        }

        let envelope = match EventEnvelope::new(
            &signal.correlation_id,
            Some(&signal.symbol),
            EventPayload::GateEvaluated { result: result.clone() },
        ) {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to build gate event envelope: {}", e);
                return;
            }
        };
        if let Err(e) = self.event_repo.append(&envelope).await {
            warn!("event log append failed, treating gate evaluation as failed: {}", e);
            return;
        }

        if result.is_pass() {
            self.pending.mark_pending(&signal.symbol, now);
            if passed_tx.send(signal).await.is_err() {
                warn!("decision engine channel closed, dropping passed signal");
            }
        }
    }

    async fn evaluate(
        &mut self,
        signal: &Signal,
        now: chrono::DateTime<chrono::Utc>,
        circuit_state: &Arc<tokio::sync::RwLock<CircuitState>>,
    ) -> GateResult {
        macro_rules! block {
            ($err:expr) => {{
                let err: GateError = $err;
                return GateResult::block(&signal.correlation_id, &signal.symbol, err.reason_code(), err.to_string());
            }};
        }

        // 1. Schema
        if let Err(detail) = signal.validate_schema() {
            block!(GateError::Schema(detail));
        }

        // 2. TTL
        let age = now - signal.produced_at;
        if age > self.config.ttl {
            block!(GateError::Ttl { age_secs: age.num_seconds(), ttl_secs: self.config.ttl.num_seconds() });
        }

        // 3. Liquidity
        if signal.daily_volume_usd < self.config.min_daily_volume_usd {
            block!(GateError::LowLiquidity {
                daily_volume_usd: signal.daily_volume_usd.to_string(),
                min: self.config.min_daily_volume_usd.to_string(),
            });
        }

        // 4. Price validity
        match self.price_cache.get(&signal.symbol, now).await {
            None => block!(GateError::PriceInvalid { symbol: signal.symbol.clone() }),
            Some(snap) if snap.stale => block!(GateError::PriceInvalid { symbol: signal.symbol.clone() }),
            Some(snap) => {
                let deviation = (signal.price - snap.price).abs() / snap.price * rust_decimal_macros::dec!(100);
                if deviation > self.config.price_tolerance_pct {
                    block!(GateError::PriceInvalid { symbol: signal.symbol.clone() });
                }
            }
        }

        // 5. Symbol policy
        if self.config.blacklist.contains(&signal.symbol) {
            block!(GateError::SymbolBlacklist { symbol: signal.symbol.clone() });
        }
        let (allowed, _layer) = self.allow_list.is_allowed(&signal.symbol, now).await;
        if !allowed {
            block!(GateError::NotAllowed { symbol: signal.symbol.clone() });
        }
        if self.pending.has_pending_entry(&signal.symbol) {
            block!(GateError::PendingEntryExists { symbol: signal.symbol.clone() });
        }
        if self.risk.read().await.state().is_symbol_in_cooldown(&signal.symbol, now) {
            block!(GateError::SymbolCooldown { symbol: signal.symbol.clone() });
        }

        // 6. Circuit state
        let state = *circuit_state.read().await;
        if state == CircuitState::Open {
            block!(GateError::CircuitOpen);
        }

        // 7. Rate limit
        if !self.rate_bucket.try_acquire() {
            block!(GateError::RateLimited);
        }

        GateResult::pass(&signal.correlation_id, &signal.symbol)
    }
}
