//! Process configuration, loaded once at startup from the environment
//! (spec §6 "Environment variables"). Every field has the documented
//! default so the process is runnable with `MODE` as the only required
//! variable; `EXCHANGE_KEY`/`EXCHANGE_SECRET` are additionally required
//! once `mode` leaves `Dry`.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dry,
    Testnet,
    Live,
}

impl Mode {
    pub fn submits_real_orders(self) -> bool {
        matches!(self, Mode::Live)
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRY" => Ok(Mode::Dry),
            "TESTNET" => Ok(Mode::Testnet),
            "LIVE" => Ok(Mode::Live),
            other => anyhow::bail!("invalid MODE '{}': must be DRY, TESTNET or LIVE", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub symbols: Vec<String>,
    pub max_daily_loss_usd: Decimal,
    pub max_open_positions: usize,
    pub max_daily_trades: u32,
    pub min_daily_volume_usd: Decimal,
    pub signal_ttl_sec: u64,
    pub signals_per_sec: u32,
    pub price_tolerance_pct: Decimal,
    pub price_stale_sec: u64,
    pub watchdog_tick_sec: u64,
    pub reconcile_period_sec: u64,
    pub heartbeat_period_sec: u64,
    pub exchange_key: String,
    pub exchange_secret: String,
    pub http_bind_addr: String,
    pub event_log_dir: String,
    pub state_dir: String,
    pub dry_run_starting_balance_usd: Decimal,
    pub webhook_url: Option<String>,
    pub model_path: String,
    pub model_allowed_hashes: Vec<String>,
}

impl Mode {
    /// Binance REST base URL for this mode; `Dry` reads from the same
    /// testnet endpoint `Testnet` does, since `DryRunExchange` still needs
    /// a real order book to simulate fills against (spec §6 "MODE").
    pub fn exchange_rest_base_url(self) -> &'static str {
        match self {
            Mode::Live => "https://api.binance.com",
            Mode::Testnet | Mode::Dry => "https://testnet.binance.vision",
        }
    }

    pub fn exchange_ws_base_url(self) -> &'static str {
        match self {
            Mode::Live => "wss://stream.binance.com:9443",
            Mode::Testnet | Mode::Dry => "wss://stream.testnet.binance.vision",
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_or(name, default)
        .parse::<T>()
        .with_context(|| format!("failed to parse {}", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = Mode::from_str(&env_or("MODE", "DRY"))?;

        let symbols: Vec<String> = env_or("SYMBOLS", "BTCUSDT")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let max_daily_loss_usd: f64 = parse_env("MAX_DAILY_LOSS_USD", "15")?;
        let min_daily_volume_usd: f64 = parse_env("MIN_DAILY_VOLUME_USD", "5000000")?;

        let exchange_key = env::var("EXCHANGE_KEY").unwrap_or_default();
        let exchange_secret = env::var("EXCHANGE_SECRET").unwrap_or_default();
        if mode != Mode::Dry && (exchange_key.is_empty() || exchange_secret.is_empty()) {
            anyhow::bail!("EXCHANGE_KEY and EXCHANGE_SECRET are required in {:?} mode", mode);
        }

        let dry_run_starting_balance_usd: f64 = parse_env("DRY_RUN_STARTING_BALANCE_USD", "10000")?;

        let model_allowed_hashes: Vec<String> = env_or("MODEL_ALLOWED_HASHES", "")
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            mode,
            symbols,
            max_daily_loss_usd: Decimal::try_from(max_daily_loss_usd).context("MAX_DAILY_LOSS_USD out of range")?,
            max_open_positions: parse_env("MAX_OPEN_POSITIONS", "2")?,
            max_daily_trades: parse_env("MAX_DAILY_TRADES", "20")?,
            min_daily_volume_usd: Decimal::try_from(min_daily_volume_usd).context("MIN_DAILY_VOLUME_USD out of range")?,
            signal_ttl_sec: parse_env("SIGNAL_TTL_SEC", "30")?,
            signals_per_sec: parse_env("SIGNALS_PER_SEC", "5")?,
            price_tolerance_pct: Decimal::try_from(parse_env::<f64>("PRICE_TOLERANCE_PCT", "1.0")?)
                .context("PRICE_TOLERANCE_PCT out of range")?,
            price_stale_sec: parse_env("PRICE_STALE_SEC", "10")?,
            watchdog_tick_sec: parse_env("WATCHDOG_TICK_SEC", "1")?,
            reconcile_period_sec: parse_env("RECONCILE_PERIOD_SEC", "60")?,
            heartbeat_period_sec: parse_env("HEARTBEAT_PERIOD_SEC", "30")?,
            exchange_key,
            exchange_secret,
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            event_log_dir: env_or("EVENT_LOG_DIR", "events"),
            state_dir: env_or("STATE_DIR", "state"),
            dry_run_starting_balance_usd: Decimal::try_from(dry_run_starting_balance_usd)
                .context("DRY_RUN_STARTING_BALANCE_USD out of range")?,
            webhook_url: env::var("WEBHOOK_URL").ok(),
            model_path: env_or("MODEL_PATH", "models/signal_classifier.onnx"),
            model_allowed_hashes,
        })
    }
}
