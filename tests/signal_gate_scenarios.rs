use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hope::application::agents::signal_gate::{SignalGate, SignalGateConfig};
use hope::application::market_data::allow_list_service::AllowListService;
use hope::application::market_data::price_cache::PriceCache;
use hope::application::risk_management::circuit_breaker_service::CircuitState;
use hope::application::risk_management::risk_state_manager::RiskStateManager;
use hope::application::system::shutdown::ShutdownHandle;
use hope::domain::allow_list::AllowListEntry;
use hope::domain::events::{EventEnvelope, EventPayload};
use hope::domain::gate::GateOutcome;
use hope::domain::repositories::{AllowListRepository, EventRepository, RiskStateRepository};
use hope::domain::risk::state::RiskState;
use hope::domain::signal::{Signal, StrategyTag};
use hope::infrastructure::observability::Metrics;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, RwLock};

struct EmptyAllowListRepo;

#[async_trait]
impl AllowListRepository for EmptyAllowListRepo {
    async fn load_all(&self) -> anyhow::Result<Vec<AllowListEntry>> {
        Ok(vec![])
    }
    async fn save_all(&self, _: &[AllowListEntry]) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FreshRiskStateRepo;

#[async_trait]
impl RiskStateRepository for FreshRiskStateRepo {
    async fn load(&self) -> anyhow::Result<RiskState> {
        Ok(RiskState::default())
    }
    async fn save(&self, _: &RiskState) -> anyhow::Result<()> {
        Ok(())
    }
}

struct RecordingEventRepository {
    results: Arc<std::sync::Mutex<Vec<hope::domain::gate::GateResult>>>,
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn append(&self, event: &EventEnvelope) -> anyhow::Result<()> {
        if let EventPayload::GateEvaluated { result } = &event.payload {
            self.results.lock().unwrap().push(result.clone());
        }
        Ok(())
    }
    async fn replay(&self, _: chrono::DateTime<chrono::Utc>, _: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<EventEnvelope>> {
        Ok(vec![])
    }
    async fn recent(&self, _: usize) -> anyhow::Result<Vec<EventEnvelope>> {
        Ok(vec![])
    }
}

fn sample_signal(symbol: &str, daily_volume_usd: rust_decimal::Decimal) -> Signal {
    Signal {
        schema_version: 1,
        id: "sig-1".into(),
        correlation_id: "corr-1".into(),
        symbol: symbol.to_string(),
        strategy_tag: StrategyTag::Pump,
        price: dec!(84000),
        delta_pct: 15.0,
        buys_per_sec: None,
        vol_raise_pct: None,
        daily_volume_usd,
        produced_at: hope::domain::ids::now(),
    }
}

async fn run_single_signal(
    signal: Signal,
    blacklist: HashSet<String>,
    min_daily_volume_usd: rust_decimal::Decimal,
    core_symbols: &[String],
) -> (Vec<hope::domain::gate::GateResult>, bool) {
    let now = hope::domain::ids::now();
    let price_cache = PriceCache::new();
    price_cache.record_tick(&signal.symbol, signal.price, now).await;

    let allow_list = Arc::new(
        AllowListService::load(Arc::new(EmptyAllowListRepo), core_symbols, dec!(5_000_000), now)
            .await
            .unwrap(),
    );
    let results = Arc::new(std::sync::Mutex::new(Vec::new()));
    let event_repo = Arc::new(RecordingEventRepository { results: results.clone() });
    let risk = Arc::new(RwLock::new(RiskStateManager::load(Arc::new(FreshRiskStateRepo), dec!(10_000)).await));

    let gate = SignalGate::new(
        SignalGateConfig { ttl: chrono::Duration::seconds(30), min_daily_volume_usd, price_tolerance_pct: dec!(1), blacklist },
        price_cache,
        allow_list,
        risk,
        event_repo,
        100,
        Metrics::new(),
    );

    let (signal_tx, signal_rx) = mpsc::channel(4);
    let (passed_tx, mut passed_rx) = mpsc::channel(4);
    let (cleared_tx, cleared_rx) = mpsc::channel(4);
    let circuit_state = Arc::new(RwLock::new(CircuitState::Closed));

    signal_tx.send(signal).await.unwrap();
    drop(signal_tx);
    // Close the clear-pending-entry side channel too, so `gate.run` can reach
    // its `else => break` once the signal channel drains instead of waiting
    // forever on a channel this test never sends clears through.
    drop(cleared_tx);

    let (_shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    gate.run(signal_rx, passed_tx, circuit_state, cleared_rx, shutdown_signal).await;

    let passed = passed_rx.try_recv().is_ok();
    (results.lock().unwrap().clone(), passed)
}

#[tokio::test]
async fn btc_reject_blocks_on_symbol_blacklist() {
    let signal = sample_signal("BTCUSDT", dec!(1_000_000_000));
    let mut blacklist = HashSet::new();
    blacklist.insert("BTCUSDT".to_string());

    let (results, passed) = run_single_signal(signal, blacklist, dec!(5_000_000), &["BTCUSDT".to_string()]).await;

    assert!(!passed, "a blacklisted symbol must never reach the Decision Engine");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, GateOutcome::Block);
    assert_eq!(results[0].reason.as_deref(), Some("symbol_blacklist"));
}

#[tokio::test]
async fn low_liquidity_signal_is_blocked() {
    let signal = sample_signal("XYZUSDT", dec!(100_000));

    let (results, passed) = run_single_signal(signal, HashSet::new(), dec!(5_000_000), &["XYZUSDT".to_string()]).await;

    assert!(!passed);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, GateOutcome::Block);
    assert_eq!(results[0].reason.as_deref(), Some("low_liquidity"));
}

#[tokio::test]
async fn signal_passing_every_guard_reaches_the_decision_engine() {
    let signal = sample_signal("PEPEUSDT", dec!(50_000_000));

    let (results, passed) = run_single_signal(signal, HashSet::new(), dec!(5_000_000), &["PEPEUSDT".to_string()]).await;

    assert!(passed, "a clean signal over an allow-listed, liquid symbol should pass the gate");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, GateOutcome::Pass);
}
