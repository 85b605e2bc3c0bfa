//! `SentimentProvider` adapter (spec §4.6c). Wraps the Alternative.me
//! Crypto Fear & Greed index, re-scaled from its native 0-100 scale into
//! the [0,1] adjustment the Alpha Chamber blends in. Per-symbol sentiment
//! isn't available from this source, so every symbol gets the same
//! market-wide reading.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::domain::ports::SentimentProvider;

#[derive(Debug, Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
}

struct Cached {
    adjustment: f64,
    fetched_at: Instant,
}

/// Caches the last good reading for `ttl` so a transient API hiccup
/// doesn't force every Alpha Chamber evaluation back to the neutral
/// default; only an empty cache falls back to 0.5.
pub struct FearGreedSentimentProvider {
    client: Client,
    url: String,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
}

impl FearGreedSentimentProvider {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: "https://api.alternative.me/fng/".to_string(),
            ttl: Duration::from_secs(3600),
            cache: RwLock::new(None),
        }
    }

    fn cached_fresh(&self) -> Option<f64> {
        let guard = self.cache.read().ok()?;
        let cached = guard.as_ref()?;
        (cached.fetched_at.elapsed() < self.ttl).then_some(cached.adjustment)
    }

    async fn fetch(&self) -> Result<f64> {
        let response = self.client.get(&self.url).send().await.context("fear & greed request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("fear & greed API returned {}", response.status());
        }
        let body: FngResponse = response.json().await.context("failed to parse fear & greed response")?;
        let entry = body.data.first().context("fear & greed response had no entries")?;
        let value: f64 = entry.value.parse().context("failed to parse fear & greed value")?;
        Ok((value / 100.0).clamp(0.0, 1.0))
    }
}

impl Default for FearGreedSentimentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentProvider for FearGreedSentimentProvider {
    async fn adjustment(&self, _symbol: &str) -> Result<f64> {
        match self.fetch().await {
            Ok(adjustment) => {
                if let Ok(mut guard) = self.cache.write() {
                    *guard = Some(Cached { adjustment, fetched_at: Instant::now() });
                }
                Ok(adjustment)
            }
            Err(e) => {
                if let Some(stale) = self.cached_fresh() {
                    warn!("fear & greed fetch failed, using cached reading: {}", e);
                    return Ok(stale);
                }
                warn!("fear & greed fetch failed and no cache available, defaulting to neutral: {}", e);
                Ok(0.5)
            }
        }
    }
}
