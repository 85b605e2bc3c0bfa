//! Headless HTTP surface (spec §6): read-only health/status/positions/event
//! queries plus the three operator/ingest write endpoints. No authentication
//! layer is specified, so this is expected to sit behind a private network
//! or reverse proxy, same as the rest of the process.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::agents::position_tracker::PositionBook;
use crate::application::monitoring::health_service::HealthService;
use crate::application::risk_management::commands::RiskCommand;
use crate::application::risk_management::shared_state::SharedRiskSnapshot;
use crate::domain::ids;
use crate::domain::repositories::EventRepository;
use crate::domain::signal::{Signal, StrategyTag};

#[derive(Clone)]
pub struct AppState {
    pub health_service: Arc<HealthService>,
    pub book: PositionBook,
    pub risk_snapshot: SharedRiskSnapshot,
    pub event_repo: Arc<dyn EventRepository>,
    pub risk_cmd_tx: mpsc::Sender<RiskCommand>,
    pub signal_tx: mpsc::Sender<Signal>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/positions", get(positions))
        .route("/api/events", get(events))
        .route("/circuit-breaker/reset", post(reset_circuit_breaker))
        .route("/kill-switch/:state", post(set_kill_switch))
        .route("/ingest/signal", post(ingest_signal))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health_service.report().await;
    let status = if report.ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

#[derive(Serialize)]
struct StatusResponse {
    circuit_state: String,
    kill_switch_tripped: bool,
    daily_pnl_usd: rust_decimal::Decimal,
    daily_trade_count: u32,
    open_positions_count: usize,
    open_notional_usd: rust_decimal::Decimal,
    balance: rust_decimal::Decimal,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = *state.risk_snapshot.read().await;
    Json(StatusResponse {
        circuit_state: snapshot.circuit_state.to_string(),
        kill_switch_tripped: snapshot.kill_switch_tripped,
        daily_pnl_usd: snapshot.daily_pnl_usd,
        daily_trade_count: snapshot.daily_trade_count,
        open_positions_count: snapshot.open_positions_count,
        open_notional_usd: snapshot.open_notional_usd,
        balance: snapshot.balance,
    })
}

async fn positions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.book.all().await)
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(rename = "type")]
    event_type: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    let result = match (query.from, query.to) {
        (Some(from), Some(to)) => state.event_repo.replay(from, to).await,
        _ => state.event_repo.recent(200).await,
    };

    match result {
        Ok(mut events) => {
            if let Some(ref type_name) = query.event_type {
                events.retain(|e| e.payload.type_name() == type_name);
            }
            Json(events).into_response()
        }
        Err(e) => {
            warn!("failed to read event log: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("event log read failed: {}", e)).into_response()
        }
    }
}

async fn reset_circuit_breaker(State(state): State<AppState>) -> impl IntoResponse {
    match state.risk_cmd_tx.send(RiskCommand::ResetCircuitBreaker).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn set_kill_switch(State(state): State<AppState>, Path(requested): Path<String>) -> impl IntoResponse {
    let command = match requested.as_str() {
        "on" => RiskCommand::KillSwitchOn { reason: "operator request via HTTP".to_string() },
        "off" => RiskCommand::KillSwitchOff,
        other => {
            return (StatusCode::BAD_REQUEST, format!("unknown kill switch state '{}', expected 'on' or 'off'", other))
                .into_response();
        }
    };
    match state.risk_cmd_tx.send(command).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Inbound shape for `POST /ingest/signal`; the server stamps `id`,
/// `correlation_id` and `produced_at` itself so callers only supply the
/// observation.
#[derive(Deserialize)]
struct IngestSignalRequest {
    symbol: String,
    strategy_tag: StrategyTag,
    price: rust_decimal::Decimal,
    delta_pct: f64,
    buys_per_sec: Option<f64>,
    vol_raise_pct: Option<f64>,
    daily_volume_usd: rust_decimal::Decimal,
}

async fn ingest_signal(State(state): State<AppState>, Json(request): Json<IngestSignalRequest>) -> impl IntoResponse {
    let correlation_id = ids::new_correlation_id();
    let signal = Signal {
        schema_version: 1,
        id: ids::client_order_id(&correlation_id, "signal"),
        correlation_id,
        symbol: request.symbol.to_uppercase(),
        strategy_tag: request.strategy_tag,
        price: request.price,
        delta_pct: request.delta_pct,
        buys_per_sec: request.buys_per_sec,
        vol_raise_pct: request.vol_raise_pct,
        daily_volume_usd: request.daily_volume_usd,
        produced_at: ids::now(),
    };

    if let Err(e) = signal.validate_schema() {
        return (StatusCode::BAD_REQUEST, e).into_response();
    }

    match state.signal_tx.send(signal).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "signal gate is not accepting signals").into_response(),
    }
}
