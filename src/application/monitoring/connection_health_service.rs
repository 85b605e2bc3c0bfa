//! Per-feed connectivity tracking (spec.md §4.9's PANIC_API_SILENT condition
//! and §4.11's `/api/health` surface share one source of truth here, rather
//! than each re-deriving "is the exchange reachable" independently).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Clone)]
pub struct ConnectionHealthService {
    inner: Arc<RwLock<HashMap<String, FeedStatus>>>,
}

impl ConnectionHealthService {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn record_success(&self, feed: &str, at: DateTime<Utc>) {
        let mut map = self.inner.write().await;
        let status = map.entry(feed.to_string()).or_default();
        status.last_success_at = Some(at);
        status.consecutive_failures = 0;
    }

    pub async fn record_failure(&self, feed: &str, at: DateTime<Utc>) {
        let mut map = self.inner.write().await;
        let status = map.entry(feed.to_string()).or_default();
        status.last_failure_at = Some(at);
        status.consecutive_failures += 1;
    }

    /// A feed counts as silent once it has never succeeded, or its last
    /// success is older than `silence_after`.
    pub async fn is_silent(&self, feed: &str, now: DateTime<Utc>, silence_after: chrono::Duration) -> bool {
        match self.inner.read().await.get(feed).and_then(|s| s.last_success_at) {
            Some(last) => now - last > silence_after,
            None => true,
        }
    }

    pub async fn snapshot(&self) -> Vec<(String, FeedStatus)> {
        self.inner.read().await.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

impl Default for ConnectionHealthService {
    fn default() -> Self {
        Self::new()
    }
}
