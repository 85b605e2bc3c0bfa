//! Three-layer tradable-symbol set (spec §3 `AllowList`, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowListLayer {
    /// Fixed configuration list. Never expires.
    Core,
    /// Refreshed on an hourly ticker snapshot from 24h quote-volume.
    Dynamic,
    /// Added by the signal pipeline on momentum detections; 15-minute TTL.
    Hot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowListEntry {
    pub schema_version: u32,
    pub symbol: String,
    pub layer: AllowListLayer,
    pub added_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AllowListEntry {
    pub fn core(symbol: &str, added_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: 1,
            symbol: symbol.to_string(),
            layer: AllowListLayer::Core,
            added_at,
            expires_at: None,
        }
    }

    pub fn dynamic(symbol: &str, added_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            schema_version: 1,
            symbol: symbol.to_string(),
            layer: AllowListLayer::Dynamic,
            added_at,
            expires_at: Some(added_at + ttl),
        }
    }

    pub fn hot(symbol: &str, added_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: 1,
            symbol: symbol.to_string(),
            layer: AllowListLayer::Hot,
            added_at,
            expires_at: Some(added_at + chrono::Duration::minutes(15)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_entries_never_expire() {
        let e = AllowListEntry::core("BTCUSDT", Utc::now());
        assert!(!e.is_expired(Utc::now() + chrono::Duration::days(3650)));
    }

    #[test]
    fn hot_entry_expires_after_fifteen_minutes() {
        let now = Utc::now();
        let e = AllowListEntry::hot("PEPEUSDT", now);
        assert!(!e.is_expired(now + chrono::Duration::minutes(14)));
        assert!(e.is_expired(now + chrono::Duration::minutes(15)));
    }
}
