//! Latest-price-per-symbol cache (spec §4.2). Writers: the Price Feed
//! websocket adapter via `record_tick`. Readers: Decision Engine, Watchdog,
//! Outcome Tracker, all through `get`, which fails closed on staleness.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

const STALE_AFTER: chrono::Duration = chrono::Duration::seconds(10);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    price: Decimal,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceSnapshot {
    pub price: Decimal,
    pub age: chrono::Duration,
    pub stale: bool,
}

#[derive(Clone)]
pub struct PriceCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    stale_after: chrono::Duration,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            stale_after: STALE_AFTER,
        }
    }

    pub fn with_staleness(stale_after: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            stale_after,
        }
    }

    pub async fn record_tick(&self, symbol: &str, price: Decimal, exchange_time: DateTime<Utc>) {
        self.inner
            .write()
            .await
            .insert(symbol.to_string(), CacheEntry { price, received_at: exchange_time });
    }

    /// Returns `None` when the symbol has never ticked; callers must treat
    /// that the same as `stale=true` (fail-closed, spec §4.2).
    pub async fn get(&self, symbol: &str, now: DateTime<Utc>) -> Option<PriceSnapshot> {
        let guard = self.inner.read().await;
        let entry = guard.get(symbol)?;
        let age = now - entry.received_at;
        Some(PriceSnapshot {
            price: entry.price,
            age,
            stale: age > self.stale_after,
        })
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}
