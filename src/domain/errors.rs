//! Error taxonomy for the trading core (spec §7).
//!
//! Each enum maps to one propagation policy:
//! - `GateError` / `DecisionError` -> handled locally, recorded, decision is SKIP.
//! - `ExecutionError` -> transient variants retried with backoff; permanent
//!   variants bubble up as `Order(REJECTED)`.
//! - `ReconcileError` -> trips the Circuit Breaker to OPEN, pages the Notifier.
//! - `CoreError::LogWriteFailure` -> fatal; process shuts down gracefully.
//! - `CoreError::InternalInvariant` -> fatal after a single reconcile attempt.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("schema: {0}")]
    Schema(String),
    #[error("signal ttl exceeded: age_secs={age_secs} ttl_secs={ttl_secs}")]
    Ttl { age_secs: i64, ttl_secs: i64 },
    #[error("low_liquidity: daily_volume_usd={daily_volume_usd} min={min}")]
    LowLiquidity { daily_volume_usd: String, min: String },
    #[error("stale or divergent price for {symbol}")]
    PriceInvalid { symbol: String },
    #[error("symbol_blacklist: {symbol}")]
    SymbolBlacklist { symbol: String },
    #[error("not_allowed: {symbol}")]
    NotAllowed { symbol: String },
    #[error("delisted: {symbol}")]
    Delisted { symbol: String },
    #[error("symbol_cooldown: {symbol}")]
    SymbolCooldown { symbol: String },
    #[error("circuit_open")]
    CircuitOpen,
    #[error("rate_limited")]
    RateLimited,
    #[error("pending_entry_exists: {symbol}")]
    PendingEntryExists { symbol: String },
}

impl GateError {
    /// Stable machine-readable reason code, used as `GateResult.reason` and
    /// asserted verbatim by end-to-end scenarios (spec §8).
    pub fn reason_code(&self) -> &'static str {
        match self {
            GateError::Schema(_) => "schema_invalid",
            GateError::Ttl { .. } => "signal_expired",
            GateError::LowLiquidity { .. } => "low_liquidity",
            GateError::PriceInvalid { .. } => "price_invalid",
            GateError::SymbolBlacklist { .. } => "symbol_blacklist",
            GateError::NotAllowed { .. } => "not_allowed",
            GateError::Delisted { .. } => "delisted",
            GateError::SymbolCooldown { .. } => "symbol_cooldown",
            GateError::CircuitOpen => "circuit_open",
            GateError::RateLimited => "rate_limited",
            GateError::PendingEntryExists { .. } => "pending_entry_exists",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("risk_vetoed: {0:?}")]
    RiskVetoed(Vec<String>),
    #[error("noise_tier")]
    NoiseTier,
    #[error("risk_reward_below_floor: tp_pct={tp_pct} sl_pct={sl_pct}")]
    RiskRewardBelowFloor { tp_pct: String, sl_pct: String },
    #[error("target_exceeds_max_tp")]
    TargetExceedsMax,
    #[error("notional_below_min")]
    NotionalBelowMin,
    #[error("executor_busy")]
    ExecutorBusy,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("rate_limit: {0}")]
    RateLimit(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Transient(_) | ExecutionError::RateLimit(_))
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("position mismatch: {0} discrepancies")]
    Mismatch(usize),
    #[error("exchange unreachable: {0}")]
    ExchangeUnreachable(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("log write failed: {0}")]
    LogWriteFailure(String),
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}
