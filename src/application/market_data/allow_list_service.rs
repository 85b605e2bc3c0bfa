//! Combines CORE/DYNAMIC/HOT allowlist layers by union (spec §4.3).
//! Every mutation is persisted through `AllowListRepository` as an atomic
//! file rewrite and should be followed by an `EventPayload` the caller
//! publishes; this service only owns the in-memory view and eviction rules.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::allow_list::{AllowListEntry, AllowListLayer};
use crate::domain::repositories::AllowListRepository;

pub struct AllowListService {
    entries: RwLock<HashMap<String, AllowListEntry>>,
    repository: Arc<dyn AllowListRepository>,
    dynamic_volume_threshold_usd: Decimal,
}

impl AllowListService {
    pub async fn load(
        repository: Arc<dyn AllowListRepository>,
        core_symbols: &[String],
        dynamic_volume_threshold_usd: Decimal,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let mut entries: HashMap<String, AllowListEntry> = repository
            .load_all()
            .await?
            .into_iter()
            .map(|e| (e.symbol.clone(), e))
            .collect();

        for symbol in core_symbols {
            entries
                .entry(symbol.clone())
                .or_insert_with(|| AllowListEntry::core(symbol, now));
        }

        Ok(Self {
            entries: RwLock::new(entries),
            repository,
            dynamic_volume_threshold_usd,
        })
    }

    pub async fn is_allowed(&self, symbol: &str, now: DateTime<Utc>) -> (bool, Option<AllowListLayer>) {
        let guard = self.entries.read().await;
        match guard.get(symbol) {
            Some(entry) if !entry.is_expired(now) => (true, Some(entry.layer)),
            _ => (false, None),
        }
    }

    /// Hourly ticker snapshot: includes a symbol when its 24h quote-volume
    /// clears the configured threshold, evicts DYNAMIC entries that no
    /// longer clear it or weren't refreshed (spec §4.3).
    pub async fn refresh_dynamic(&self, volumes: &HashMap<String, Decimal>, now: DateTime<Utc>) {
        let mut guard = self.entries.write().await;
        guard.retain(|_, e| e.layer != AllowListLayer::Dynamic);

        for (symbol, volume) in volumes {
            if *volume >= self.dynamic_volume_threshold_usd {
                guard.insert(
                    symbol.clone(),
                    AllowListEntry::dynamic(symbol, now, chrono::Duration::hours(1)),
                );
            }
        }
        let snapshot: Vec<AllowListEntry> = guard.values().cloned().collect();
        drop(guard);
        if let Err(e) = self.repository.save_all(&snapshot).await {
            tracing::warn!("failed to persist allowlist after dynamic refresh: {}", e);
        }
        info!("allowlist: dynamic layer refreshed, {} symbols", volumes.len());
    }

    /// Adds a HOT entry from the signal pipeline (spec §4.3: 15-minute TTL).
    pub async fn add_hot(&self, symbol: &str, now: DateTime<Utc>) {
        let mut guard = self.entries.write().await;
        guard.insert(symbol.to_string(), AllowListEntry::hot(symbol, now));
        let snapshot: Vec<AllowListEntry> = guard.values().cloned().collect();
        drop(guard);
        if let Err(e) = self.repository.save_all(&snapshot).await {
            tracing::warn!("failed to persist allowlist after hot add: {}", e);
        }
    }

    /// Evicts expired HOT/DYNAMIC entries; CORE never expires.
    pub async fn evict_expired(&self, now: DateTime<Utc>) {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|_, e| !e.is_expired(now));
        if guard.len() != before {
            let snapshot: Vec<AllowListEntry> = guard.values().cloned().collect();
            drop(guard);
            if let Err(e) = self.repository.save_all(&snapshot).await {
                tracing::warn!("failed to persist allowlist after eviction: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct InMemoryAllowListRepo;

    #[async_trait::async_trait]
    impl AllowListRepository for InMemoryAllowListRepo {
        async fn load_all(&self) -> anyhow::Result<Vec<AllowListEntry>> {
            Ok(vec![])
        }
        async fn save_all(&self, _entries: &[AllowListEntry]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn core_symbols_are_seeded_and_never_expire() {
        let now = Utc::now();
        let service = AllowListService::load(
            Arc::new(InMemoryAllowListRepo),
            &["BTCUSDT".to_string()],
            dec!(5_000_000),
            now,
        )
        .await
        .unwrap();
        let (allowed, layer) = service.is_allowed("BTCUSDT", now + chrono::Duration::days(365)).await;
        assert!(allowed);
        assert_eq!(layer, Some(AllowListLayer::Core));
    }

    #[tokio::test]
    async fn dynamic_refresh_excludes_symbols_below_threshold() {
        let now = Utc::now();
        let service =
            AllowListService::load(Arc::new(InMemoryAllowListRepo), &[], dec!(5_000_000), now)
                .await
                .unwrap();
        let mut volumes = HashMap::new();
        volumes.insert("PEPEUSDT".to_string(), dec!(10_000_000));
        volumes.insert("SHIBUSDT".to_string(), dec!(1_000_000));
        service.refresh_dynamic(&volumes, now).await;

        assert!(service.is_allowed("PEPEUSDT", now).await.0);
        assert!(!service.is_allowed("SHIBUSDT", now).await.0);
    }
}
