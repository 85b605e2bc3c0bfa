//! Spawns every independent concurrency loop and wires the channels and
//! shared state between them (spec §4 concurrency model L1-L6, §4.12
//! "Startup & Reconciliation"). Called once from `application::system`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::application::agents::decision_engine::{AlphaWeights, DecisionEngine, DecisionEngineConfig};
use crate::application::agents::executor::{ExecutorConfig, OrderExecutor};
use crate::application::agents::outcome_tracker::OutcomeTracker;
use crate::application::agents::position_tracker::{PositionBook, PositionTracker};
use crate::application::agents::signal_gate::{SignalGate, SignalGateConfig};
use crate::application::agents::watchdog::{Watchdog, WatchdogConfig};
use crate::application::bootstrap::persistence::PersistenceHandle;
use crate::application::bootstrap::services::ServicesHandle;
use crate::application::market_data::allow_list_service::AllowListService;
use crate::application::market_data::price_cache::PriceCache;
use crate::application::monitoring::connection_health_service::ConnectionHealthService;
use crate::application::monitoring::health_service::HealthService;
use crate::application::monitoring::metrics_reporter::MetricsReporter;
use crate::application::risk_management::circuit_breaker_service::{CircuitBreakerConfig, CircuitBreakerService, CircuitState};
use crate::application::risk_management::commands::RiskCommand;
use crate::application::risk_management::order_retry_strategy::{OrderRetryStrategy, RetryConfig};
use crate::application::risk_management::order_throttler::TokenBucket;
use crate::application::risk_management::risk_command_loop::RiskCommandLoop;
use crate::application::risk_management::risk_state_manager::RiskStateManager;
use crate::application::risk_management::shared_state::{RiskSnapshot, SharedRiskSnapshot};
use crate::application::risk_management::sizing_engine::{SizingConfig, SizingEngine};
use crate::application::risk_management::target_engine::{TargetConfig, TargetEngine};
use crate::application::system::shutdown::ShutdownSignal;
use crate::config::Config;
use crate::domain::ports::ExchangeRest;
use crate::domain::signal::Signal;
use crate::infrastructure::observability::Metrics;

pub struct AgentsHandle {
    pub signal_tx: mpsc::Sender<Signal>,
    pub risk_cmd_tx: mpsc::Sender<RiskCommand>,
    pub book: PositionBook,
    pub risk: Arc<RwLock<RiskStateManager>>,
    pub risk_snapshot: SharedRiskSnapshot,
    pub allow_list: Arc<AllowListService>,
    pub health_service: Arc<HealthService>,
}

pub struct AgentsBootstrap;

impl AgentsBootstrap {
    pub async fn init(
        config: &Config,
        persistence: &PersistenceHandle,
        services: &ServicesHandle,
        shutdown: ShutdownSignal,
    ) -> Result<AgentsHandle> {
        let now = crate::domain::ids::now();

        let starting_equity = match services.exchange.account_balances().await {
            Ok(balances) => balances.equity(),
            Err(e) => {
                warn!("failed to fetch opening balance, starting risk state at configured dry-run balance: {}", e);
                config.dry_run_starting_balance_usd
            }
        };

        let positions = persistence.position_repository.load_all().await.unwrap_or_default();
        let book = PositionBook::from_positions(positions);

        let risk_state_manager = RiskStateManager::load(persistence.risk_state_repository.clone(), starting_equity).await;
        let risk = Arc::new(RwLock::new(risk_state_manager));
        let circuit = Arc::new(RwLock::new(CircuitBreakerService::new(CircuitBreakerConfig {
            max_daily_loss_usd: config.max_daily_loss_usd,
            max_daily_trades: config.max_daily_trades,
            ..CircuitBreakerConfig::default()
        })));
        let risk_snapshot: SharedRiskSnapshot = Arc::new(RwLock::new(RiskSnapshot::initial(starting_equity)));

        let allow_list = Arc::new(
            AllowListService::load(persistence.allow_list_repository.clone(), &config.symbols, config.min_daily_volume_usd, now)
                .await?,
        );

        let price_cache = PriceCache::with_staleness(chrono::Duration::seconds(config.price_stale_sec as i64));
        let connection_health = ConnectionHealthService::new();
        let metrics = Metrics::new();

        let position_tracker = PositionTracker::new(
            book.clone(),
            persistence.position_repository.clone(),
            services.exchange.clone(),
            persistence.event_repo.clone(),
            circuit.clone(),
        );
        let reconcile_clock = position_tracker.reconcile_clock();

        let health_service = HealthService::new(
            config.mode,
            config.symbols.clone(),
            price_cache.clone(),
            book.clone(),
            risk_snapshot.clone(),
            persistence.event_repo.clone(),
            reconcile_clock,
            connection_health.clone(),
        );
        let heartbeat_period = tokio::time::interval(Duration::from_secs(config.heartbeat_period_sec));
        tokio::spawn(health_service.clone().run(heartbeat_period, shutdown.clone()));
        let health_service = Arc::new(health_service);

        let metrics_reporter = MetricsReporter::new(metrics.clone(), book.clone(), circuit.clone());
        let metrics_period = tokio::time::interval(Duration::from_secs(config.heartbeat_period_sec));
        tokio::spawn(metrics_reporter.run(metrics_period, shutdown.clone()));

        // Price feed: forwards every tick into the price cache.
        {
            let price_cache = price_cache.clone();
            let price_feed = services.price_feed.clone();
            let symbols = config.symbols.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let (tick_tx, mut tick_rx) = mpsc::channel(256);
                let feed_task = tokio::spawn(async move {
                    if let Err(e) = price_feed.run(symbols, tick_tx).await {
                        warn!("price feed terminated: {}", e);
                    }
                });
                loop {
                    tokio::select! {
                        Some(tick) = tick_rx.recv() => {
                            price_cache.record_tick(&tick.symbol, tick.price, tick.exchange_time).await;
                        }
                        _ = shutdown.triggered() => {
                            warn!("price feed forwarder stopping on shutdown signal");
                            break;
                        }
                        else => break,
                    }
                }
                feed_task.abort();
            });
        }

        // Bridges the authoritative CircuitBreakerService into the simpler
        // handle SignalGate reads, since the gate loop never needs anything
        // beyond the three-state machine itself.
        let gate_circuit_state = Arc::new(RwLock::new(CircuitState::Closed));
        {
            let gate_circuit_state = gate_circuit_state.clone();
            let circuit = circuit.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut period = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = period.tick() => {
                            let state = circuit.read().await.state();
                            *gate_circuit_state.write().await = state;
                        }
                        _ = shutdown.triggered() => {
                            warn!("circuit state bridge stopping on shutdown signal");
                            break;
                        }
                    }
                }
            });
        }

        // Signal Gate
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>(256);
        let (passed_tx, passed_rx) = mpsc::channel::<Signal>(256);
        let (cleared_tx, cleared_rx) = mpsc::channel::<String>(64);
        let gate = SignalGate::new(
            SignalGateConfig {
                ttl: chrono::Duration::seconds(config.signal_ttl_sec as i64),
                min_daily_volume_usd: config.min_daily_volume_usd,
                price_tolerance_pct: config.price_tolerance_pct,
                blacklist: HashSet::new(),
            },
            price_cache.clone(),
            allow_list.clone(),
            risk.clone(),
            persistence.event_repo.clone(),
            config.signals_per_sec,
            metrics.clone(),
        );
        tokio::spawn(gate.run(signal_rx, passed_tx, gate_circuit_state, cleared_rx, shutdown.clone()));

        // Order Executor, built ahead of the Decision Engine so its pool
        // saturation gate can be shared into the Risk Chamber.
        let (buy_tx, buy_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = mpsc::channel(64);
        let (outcome_tx, outcome_rx) = mpsc::channel(64);
        let executor = OrderExecutor::new(
            ExecutorConfig::default(),
            services.exchange.clone(),
            OrderRetryStrategy::new(RetryConfig::default()),
            TokenBucket::new(config.signals_per_sec),
            persistence.event_repo.clone(),
            book.clone(),
            outcome_tx,
            metrics.clone(),
        );
        let executor_gate = executor.load_gate();
        tokio::spawn(executor.run(buy_rx, exit_rx, shutdown.clone()));

        // Decision Engine
        let sizing_engine = SizingEngine::new(SizingConfig {
            base_pct: dec!(0.02),
            min_size_usd: dec!(10),
            max_size_usd: dec!(500),
            max_exposure_pct: dec!(0.20),
            compound_baseline_equity: starting_equity,
        });
        let target_engine = TargetEngine::new(TargetConfig::default());
        let decision_engine = DecisionEngine::new(
            DecisionEngineConfig {
                weights: AlphaWeights::default(),
                max_open_positions: config.max_open_positions,
                max_daily_trades: config.max_daily_trades,
                daily_pnl_floor_usd: -config.max_daily_loss_usd,
                adverse_announcement_blacklist: HashSet::new(),
                atr_candle_count: 14,
                default_timeout_sec: 4 * 3600,
            },
            price_cache.clone(),
            allow_list.clone(),
            circuit.clone(),
            risk_snapshot.clone(),
            services.classifier.clone(),
            services.sentiment.clone(),
            services.price_history.clone(),
            sizing_engine,
            target_engine,
            persistence.event_repo.clone(),
            metrics.clone(),
            executor_gate,
        );
        tokio::spawn(decision_engine.run(passed_rx, buy_tx, shutdown.clone()));

        // Watchdog
        let watchdog = Watchdog::new(
            WatchdogConfig::default(),
            book.clone(),
            price_cache.clone(),
            services.exchange.clone(),
            services.notifier.clone(),
            connection_health.clone(),
        );
        let watchdog_period = tokio::time::interval(Duration::from_secs(config.watchdog_tick_sec));
        tokio::spawn(watchdog.run(exit_tx, watchdog_period, shutdown.clone()));

        // Outcome Tracker
        let outcome_tracker = OutcomeTracker::new(
            persistence.event_repo.clone(),
            services.exchange.clone(),
            book.clone(),
            risk.clone(),
            circuit.clone(),
            risk_snapshot.clone(),
            services.notifier.clone(),
        );
        tokio::spawn(outcome_tracker.run(outcome_rx, shutdown.clone()));

        // Position reconciliation
        let reconcile_period = tokio::time::interval(Duration::from_secs(config.reconcile_period_sec));
        tokio::spawn(position_tracker.run(config.symbols.clone(), reconcile_period, shutdown.clone()));

        // Risk command loop (operator HTTP actions + daily rollover)
        let (risk_cmd_tx, risk_cmd_rx) = mpsc::channel(32);
        let risk_loop = RiskCommandLoop::new(risk.clone(), circuit.clone(), book.clone(), risk_snapshot.clone());
        tokio::spawn(risk_loop.run(risk_cmd_rx, shutdown.clone()));

        // Daily rollover tick, driven independently of trade outcomes.
        {
            let risk_cmd_tx = risk_cmd_tx.clone();
            let exchange = services.exchange.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut period = tokio::time::interval(Duration::from_secs(3600));
                loop {
                    tokio::select! {
                        _ = period.tick() => {
                            let equity = match exchange.account_balances().await {
                                Ok(b) => b.equity(),
                                Err(e) => {
                                    warn!("failed to fetch equity for valuation tick: {}", e);
                                    continue;
                                }
                            };
                            if risk_cmd_tx.send(RiskCommand::ValuationTick { current_equity: equity }).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown.triggered() => {
                            warn!("valuation tick stopping on shutdown signal");
                            break;
                        }
                    }
                }
            });
        }

        // Allowlist maintenance: hourly dynamic refresh, periodic eviction.
        {
            let allow_list = allow_list.clone();
            let exchange = services.exchange.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut period = tokio::time::interval(Duration::from_secs(3600));
                loop {
                    tokio::select! {
                        _ = period.tick() => {
                            let now = crate::domain::ids::now();
                            allow_list.evict_expired(now).await;
                            match exchange.exchange_info_24h_volume().await {
                                Ok(volumes) => allow_list.refresh_dynamic(&volumes, now).await,
                                Err(e) => warn!("failed to fetch 24h volumes for allowlist refresh: {}", e),
                            }
                        }
                        _ = shutdown.triggered() => {
                            warn!("allowlist maintenance stopping on shutdown signal");
                            break;
                        }
                    }
                }
            });
        }

        let _ = cleared_tx;
        info!("all agent loops started");

        Ok(AgentsHandle { signal_tx, risk_cmd_tx, book, risk, risk_snapshot, allow_list, health_service })
    }
}
