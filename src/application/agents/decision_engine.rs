//! Decision Engine: the Alpha Chamber and Risk Chamber evaluate every
//! gate-passed signal independently; a decision is BUY iff both agree
//! (spec §4.6). Every evaluation is recorded as a `DecisionMade` event
//! whether it results in BUY or SKIP, and BUY decisions are forwarded to
//! the Order Executor.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{instrument, warn};

use crate::application::market_data::allow_list_service::AllowListService;
use crate::application::market_data::price_cache::PriceCache;
use crate::application::risk_management::circuit_breaker_service::{CircuitBreakerService, CircuitState};
use crate::application::risk_management::shared_state::SharedRiskSnapshot;
use crate::application::risk_management::sizing_engine::SizingEngine;
use crate::application::risk_management::target_engine::TargetEngine;
use crate::application::system::shutdown::ShutdownSignal;
use crate::domain::decision::{Action, Decision, SignalTier};
use crate::domain::errors::DecisionError;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::ports::{PriceHistory, SentimentProvider, SignalClassifier};
use crate::domain::repositories::EventRepository;
use crate::domain::signal::{Signal, StrategyTag};
use crate::infrastructure::observability::Metrics;

#[derive(Debug, Clone, Copy)]
pub struct AlphaWeights {
    pub technical: f64,
    pub model: f64,
    pub sentiment: f64,
    pub precursor: f64,
}

impl Default for AlphaWeights {
    fn default() -> Self {
        Self { technical: 0.40, model: 0.35, sentiment: 0.15, precursor: 0.10 }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngineConfig {
    pub weights: AlphaWeights,
    pub max_open_positions: usize,
    pub max_daily_trades: u32,
    pub daily_pnl_floor_usd: Decimal,
    pub adverse_announcement_blacklist: HashSet<String>,
    pub atr_candle_count: usize,
    pub default_timeout_sec: u64,
}

pub struct DecisionEngine {
    config: DecisionEngineConfig,
    price_cache: PriceCache,
    allow_list: Arc<AllowListService>,
    circuit: Arc<RwLock<CircuitBreakerService>>,
    risk_snapshot: SharedRiskSnapshot,
    classifier: Arc<dyn SignalClassifier>,
    sentiment: Arc<dyn SentimentProvider>,
    price_history: Arc<dyn PriceHistory>,
    sizing_engine: SizingEngine,
    target_engine: TargetEngine,
    event_repo: Arc<dyn EventRepository>,
    metrics: Metrics,
    executor_gate: Arc<Semaphore>,
}

impl DecisionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DecisionEngineConfig,
        price_cache: PriceCache,
        allow_list: Arc<AllowListService>,
        circuit: Arc<RwLock<CircuitBreakerService>>,
        risk_snapshot: SharedRiskSnapshot,
        classifier: Arc<dyn SignalClassifier>,
        sentiment: Arc<dyn SentimentProvider>,
        price_history: Arc<dyn PriceHistory>,
        sizing_engine: SizingEngine,
        target_engine: TargetEngine,
        event_repo: Arc<dyn EventRepository>,
        metrics: Metrics,
        executor_gate: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            price_cache,
            allow_list,
            circuit,
            risk_snapshot,
            classifier,
            sentiment,
            price_history,
            sizing_engine,
            target_engine,
            event_repo,
            metrics,
            executor_gate,
        }
    }

    pub async fn run(mut self, mut passed_rx: mpsc::Receiver<Signal>, buy_tx: mpsc::Sender<Decision>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                Some(signal) = passed_rx.recv() => {
                    self.handle_signal(signal, &buy_tx).await;
                }
                _ = shutdown.triggered() => {
                    warn!("decision engine stopping on shutdown signal");
                    break;
                }
                else => break,
            }
        }
    }

    #[instrument(skip(self, signal, buy_tx), fields(symbol = %signal.symbol, correlation_id = %signal.correlation_id))]
    async fn handle_signal(&mut self, signal: Signal, buy_tx: &mpsc::Sender<Decision>) {
        let now = crate::domain::ids::now();
        let decision = self.decide(&signal, now).await;

        if decision.action == Action::Buy {
            self.metrics.record_decision_buy();
        } else {
            self.metrics.record_decision_skip();
        }

        match EventEnvelope::new(
            &signal.correlation_id,
            Some(&signal.symbol),
            EventPayload::DecisionMade { decision: decision.clone() },
        ) {
            Ok(envelope) => {
                if let Err(e) = self.event_repo.append(&envelope).await {
                    warn!("event log append failed: {}", e);
                }
            }
            Err(e) => warn!("failed to build decision event envelope: {}", e),
        }

        if decision.action == Action::Buy && buy_tx.send(decision).await.is_err() {
            warn!("order executor channel closed, dropping BUY decision");
        }
    }

    async fn decide(&mut self, signal: &Signal, now: chrono::DateTime<chrono::Utc>) -> Decision {
        let (risk_approved, risk_reasons) = self.evaluate_risk_chamber(signal, now).await;
        let (confidence, tier) = self.evaluate_alpha_chamber(signal).await;

        let mut skip_reasons = Vec::new();
        if !risk_approved {
            skip_reasons.push(DecisionError::RiskVetoed(risk_reasons.clone()).to_string());
        }
        if tier == SignalTier::Noise {
            skip_reasons.push(DecisionError::NoiseTier.to_string());
        } else if confidence < tier.confidence_threshold() {
            skip_reasons.push(format!(
                "confidence {:.2} below tier threshold {:.2}",
                confidence,
                tier.confidence_threshold()
            ));
        }

        let mut tp_pct = Decimal::ZERO;
        let mut sl_pct = Decimal::ZERO;
        if skip_reasons.is_empty() {
            match self.compute_targets(signal, tier).await {
                Some(targets) => {
                    tp_pct = targets.tp_pct;
                    sl_pct = targets.sl_pct;
                }
                None => skip_reasons.push(DecisionError::TargetExceedsMax.to_string()),
            }
        }

        let mut position_size_usd = Decimal::ZERO;
        if skip_reasons.is_empty() {
            let snapshot = *self.risk_snapshot.read().await;
            match self.sizing_engine.position_size_usd(
                snapshot.balance,
                confidence,
                snapshot.consecutive_losses,
                snapshot.open_notional_usd,
            ) {
                Some(size) => position_size_usd = size,
                None => skip_reasons.push(DecisionError::NotionalBelowMin.to_string()),
            }
        }

        let action = if skip_reasons.is_empty() { Action::Buy } else { Action::Skip };

        Decision {
            schema_version: 1,
            correlation_id: signal.correlation_id.clone(),
            symbol: signal.symbol.clone(),
            alpha_confidence: confidence,
            risk_approved,
            risk_reasons,
            action,
            confidence,
            entry_price_hint: signal.price,
            position_size_usd,
            tp_pct,
            sl_pct,
            timeout_sec: self.config.default_timeout_sec,
            signal_tier: tier,
            skip_reasons,
        }
    }

    /// Veto unless every guard holds (spec §4.6 "Risk Chamber"). Half-open
    /// circuit probes consume the single allotted entry here, not in the
    /// Signal Gate, since only the Decision Engine knows a BUY is imminent.
    /// A saturated executor pool is vetoed the same way as a busy half-open
    /// probe, via the shared `executor_gate` semaphore.
    async fn evaluate_risk_chamber(
        &mut self,
        signal: &Signal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> (bool, Vec<String>) {
        let mut reasons = Vec::new();

        let (allowed, _layer) = self.allow_list.is_allowed(&signal.symbol, now).await;
        if !allowed {
            reasons.push(format!("not_allowed: {}", signal.symbol));
        }
        if self.config.adverse_announcement_blacklist.contains(&signal.symbol) {
            reasons.push(format!("adverse_announcement: {}", signal.symbol));
        }

        let snapshot = *self.risk_snapshot.read().await;
        if snapshot.open_positions_count >= self.config.max_open_positions {
            reasons.push(format!(
                "open_positions {} >= max {}",
                snapshot.open_positions_count, self.config.max_open_positions
            ));
        }
        if snapshot.daily_trade_count >= self.config.max_daily_trades {
            reasons.push(format!(
                "daily_trade_count {} >= max {}",
                snapshot.daily_trade_count, self.config.max_daily_trades
            ));
        }
        if snapshot.daily_pnl_usd <= self.config.daily_pnl_floor_usd {
            reasons.push(format!(
                "daily_pnl_usd {} at/below floor {}",
                snapshot.daily_pnl_usd, self.config.daily_pnl_floor_usd
            ));
        }

        match self.price_cache.get(&signal.symbol, now).await {
            None => reasons.push(format!("price_invalid: {}", signal.symbol)),
            Some(snap) if snap.stale => reasons.push(format!("price_stale: {}", signal.symbol)),
            _ => {}
        }

        {
            let mut circuit = self.circuit.write().await;
            match circuit.state() {
                CircuitState::Open => reasons.push("circuit_open".to_string()),
                CircuitState::HalfOpen => {
                    if !circuit.try_consume_half_open_entry() {
                        reasons.push(DecisionError::ExecutorBusy.to_string());
                    }
                }
                CircuitState::Closed => {}
            }
        }

        if self.executor_gate.available_permits() == 0 {
            reasons.push(DecisionError::ExecutorBusy.to_string());
        }

        (reasons.is_empty(), reasons)
    }

    /// Blends technical precursors, the pre-trained classifier, and
    /// sentiment into a confidence in [0,1], then selects a tier from the
    /// resulting delta and confidence (spec §4.6 "Alpha Chamber").
    async fn evaluate_alpha_chamber(&self, signal: &Signal) -> (f64, SignalTier) {
        let volume_spike = signal.vol_raise_pct.unwrap_or(0.0) >= 50.0;
        let buys_per_sec_ok = signal.buys_per_sec.unwrap_or(0.0) >= 3.0;
        let positive_delta = signal.delta_pct > 0.0;
        let hits = [volume_spike, buys_per_sec_ok, positive_delta]
            .iter()
            .filter(|v| **v)
            .count();
        let precursor_score = hits as f64 / 3.0;
        let technical_score = precursor_score;

        let features = [
            signal.delta_pct as f32,
            signal.buys_per_sec.unwrap_or(0.0) as f32,
            signal.vol_raise_pct.unwrap_or(0.0) as f32,
        ];
        let model_score = self.classifier.score(&features).unwrap_or(0.5) as f64;

        let sentiment_score = self
            .sentiment
            .adjustment(&signal.symbol)
            .await
            .unwrap_or(0.5);

        let confidence = (self.config.weights.technical * technical_score
            + self.config.weights.model * model_score
            + self.config.weights.sentiment * sentiment_score
            + self.config.weights.precursor * precursor_score)
            .clamp(0.0, 1.0);

        let delta_abs = signal.delta_pct.abs();
        let tier = if signal.strategy_tag == StrategyTag::Momentum24h
            && confidence >= SignalTier::Momentum.confidence_threshold()
        {
            SignalTier::Momentum
        } else if delta_abs >= 5.0 && confidence >= SignalTier::Strong.confidence_threshold() {
            SignalTier::Strong
        } else if delta_abs >= 2.0 && confidence >= SignalTier::Medium.confidence_threshold() {
            SignalTier::Medium
        } else if delta_abs >= 0.5 && confidence >= SignalTier::Weak.confidence_threshold() {
            SignalTier::Weak
        } else {
            SignalTier::Noise
        };

        (confidence, tier)
    }

    async fn compute_targets(
        &self,
        signal: &Signal,
        tier: SignalTier,
    ) -> Option<crate::application::risk_management::target_engine::Targets> {
        let candles = self
            .price_history
            .recent_candles(&signal.symbol, self.config.atr_candle_count)
            .await
            .ok()?;
        let atr = TargetEngine::atr(&candles)?;
        self.target_engine.compute(signal.price, atr, tier)
    }
}
