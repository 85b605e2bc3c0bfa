//! Health/Heartbeat loop (spec §4.11, concurrency model L6). Builds the
//! `GET /api/health` payload on demand and emits a `Heartbeat` event every
//! `HEARTBEAT_PERIOD_SEC`; the external supervisor restarts the process if
//! heartbeats cease for more than 120s.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::application::agents::position_tracker::{PositionBook, SharedReconcileClock};
use crate::application::monitoring::connection_health_service::ConnectionHealthService;
use crate::application::risk_management::shared_state::SharedRiskSnapshot;
use crate::application::market_data::price_cache::PriceCache;
use crate::application::system::shutdown::ShutdownSignal;
use crate::config::Mode;
use crate::domain::events::{EventEnvelope, EventPayload};
use crate::domain::health::{DailyStats, HealthReport, SymbolStaleness};
use crate::domain::repositories::EventRepository;

const EXCHANGE_REST_FEED: &str = "exchange_rest";

#[derive(Clone)]
pub struct HealthService {
    started_at: Instant,
    mode: Mode,
    symbols: Vec<String>,
    price_cache: PriceCache,
    book: PositionBook,
    risk_snapshot: SharedRiskSnapshot,
    event_repo: Arc<dyn EventRepository>,
    last_reconciled_at: SharedReconcileClock,
    connection_health: ConnectionHealthService,
}

impl HealthService {
    pub fn new(
        mode: Mode,
        symbols: Vec<String>,
        price_cache: PriceCache,
        book: PositionBook,
        risk_snapshot: SharedRiskSnapshot,
        event_repo: Arc<dyn EventRepository>,
        last_reconciled_at: SharedReconcileClock,
        connection_health: ConnectionHealthService,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            mode,
            symbols,
            price_cache,
            book,
            risk_snapshot,
            event_repo,
            last_reconciled_at,
            connection_health,
        }
    }

    pub async fn run(self, mut period: tokio::time::Interval, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = period.tick() => {
                    let report = self.report().await;
                    if let Ok(envelope) = EventEnvelope::new("system", None, EventPayload::Heartbeat { uptime_sec: report.uptime_sec }) {
                        if let Err(e) = self.event_repo.append(&envelope).await {
                            warn!("failed to append heartbeat event: {}", e);
                        }
                    }
                }
                _ = shutdown.triggered() => {
                    warn!("health service stopping on shutdown signal");
                    break;
                }
            }
        }
    }

    /// Builds the health payload fresh on every call; cheap enough to serve
    /// directly from an HTTP handler without caching.
    pub async fn report(&self) -> HealthReport {
        let now = crate::domain::ids::now();
        let mut diagnostics = Vec::new();

        let mut price_staleness = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            match self.price_cache.get(symbol, now).await {
                Some(snapshot) => {
                    if snapshot.stale {
                        diagnostics.push(format!("price_stale: {}", symbol));
                    }
                    price_staleness.push(SymbolStaleness { symbol: symbol.clone(), age_sec: snapshot.age.num_seconds(), stale: snapshot.stale });
                }
                None => {
                    diagnostics.push(format!("price_missing: {}", symbol));
                    price_staleness.push(SymbolStaleness { symbol: symbol.clone(), age_sec: i64::MAX, stale: true });
                }
            }
        }

        let snapshot = *self.risk_snapshot.read().await;
        if snapshot.kill_switch_tripped {
            diagnostics.push("kill_switch_tripped".to_string());
        }

        let last_event_log_append_at = match self.event_repo.recent(1).await {
            Ok(events) => events.first().map(|e| e.produced_at),
            Err(e) => {
                diagnostics.push(format!("event_log_unreadable: {}", e));
                None
            }
        };

        let last_reconciliation_at = *self.last_reconciled_at.read().await;
        if last_reconciliation_at.is_none() {
            diagnostics.push("never_reconciled".to_string());
        }

        let exchange_reachable =
            !self.connection_health.is_silent(EXCHANGE_REST_FEED, now, chrono::Duration::seconds(60)).await;
        if !exchange_reachable {
            diagnostics.push("exchange_unreachable".to_string());
        }

        let circuit_state = match snapshot.circuit_state {
            crate::application::risk_management::circuit_breaker_service::CircuitState::Closed => "closed",
            crate::application::risk_management::circuit_breaker_service::CircuitState::Open => "open",
            crate::application::risk_management::circuit_breaker_service::CircuitState::HalfOpen => "half_open",
        };

        HealthReport {
            uptime_sec: self.started_at.elapsed().as_secs(),
            mode: match self.mode {
                Mode::Dry => "DRY",
                Mode::Testnet => "TESTNET",
                Mode::Live => "LIVE",
            }
            .to_string(),
            open_positions: self.book.count().await,
            daily_stats: DailyStats {
                pnl_usd: snapshot.daily_pnl_usd,
                trade_count: snapshot.daily_trade_count,
                wins: snapshot.daily_wins_count,
                losses: snapshot.daily_losses_count,
                consecutive_losses: snapshot.consecutive_losses,
            },
            circuit_state: circuit_state.to_string(),
            price_staleness,
            last_event_log_append_at,
            last_reconciliation_at,
            exchange_reachable,
            ready: diagnostics.is_empty(),
            diagnostics,
        }
    }
}
