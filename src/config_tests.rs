use crate::config::{Config, Mode};
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

fn clear_hope_env() {
    for key in [
        "MODE",
        "SYMBOLS",
        "MAX_DAILY_LOSS_USD",
        "MAX_OPEN_POSITIONS",
        "MIN_DAILY_VOLUME_USD",
        "SIGNAL_TTL_SEC",
        "EXCHANGE_KEY",
        "EXCHANGE_SECRET",
    ] {
        env::remove_var(key);
    }
}

#[test]
fn defaults_apply_in_dry_mode_with_no_env() {
    let _guard = get_env_lock().lock().unwrap();
    clear_hope_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.mode, Mode::Dry);
    assert_eq!(config.max_open_positions, 2);
    assert_eq!(config.signal_ttl_sec, 30);
    assert_eq!(config.symbols, vec!["BTCUSDT".to_string()]);

    clear_hope_env();
}

#[test]
fn live_mode_requires_exchange_credentials() {
    let _guard = get_env_lock().lock().unwrap();
    clear_hope_env();
    env::set_var("MODE", "LIVE");

    let result = Config::from_env();
    assert!(result.is_err());

    clear_hope_env();
}

#[test]
fn live_mode_succeeds_with_credentials_present() {
    let _guard = get_env_lock().lock().unwrap();
    clear_hope_env();
    env::set_var("MODE", "LIVE");
    env::set_var("EXCHANGE_KEY", "key");
    env::set_var("EXCHANGE_SECRET", "secret");

    let config = Config::from_env().unwrap();
    assert_eq!(config.mode, Mode::Live);

    clear_hope_env();
}

#[test]
fn symbols_are_split_trimmed_and_uppercased() {
    let _guard = get_env_lock().lock().unwrap();
    clear_hope_env();
    env::set_var("SYMBOLS", " btcusdt, pepeusdt ,ethusdt");

    let config = Config::from_env().unwrap();
    assert_eq!(config.symbols, vec!["BTCUSDT", "PEPEUSDT", "ETHUSDT"]);

    clear_hope_env();
}

#[test]
fn invalid_mode_is_rejected() {
    let _guard = get_env_lock().lock().unwrap();
    clear_hope_env();
    env::set_var("MODE", "BOGUS");

    assert!(Config::from_env().is_err());

    clear_hope_env();
}
