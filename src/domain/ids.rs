//! Clock & IDs: monotonic-ish timestamps, correlation/event id minting, and the
//! SHA-256 hasher used for canonical-payload event ids and deterministic
//! client-order-ids.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current UTC time. Centralized so tests can be written against a fixed
/// reference without threading a clock trait through every component.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Mint a new correlation id. One is minted per inbound `Signal` and threads
/// through every event derived from it (Signal -> Decision -> Order -> Fill ->
/// Close -> Outcome).
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// `sha256(type || correlation_id || ts || canonical_payload)[:16]`, hex-encoded.
///
/// `payload` must already be in its canonical (stable field order) JSON form;
/// callers are responsible for serializing with `serde_json::to_string`
/// (which preserves struct field declaration order, not a sorted order, so
/// schemas must not be reordered without a `schema_version` bump).
pub fn event_id(event_type: &str, correlation_id: &str, ts: DateTime<Utc>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.as_bytes());
    hasher.update(correlation_id.as_bytes());
    hasher.update(ts.to_rfc3339().as_bytes());
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8]) // 8 bytes -> 16 hex chars
}

/// sha256 of an arbitrary byte slice, full 32-byte hex digest. Used to verify
/// the signal classifier's model bytes against a registry hash before load.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic client-order-id: `"HOPE-" + first 24 hex chars of
/// sha256(correlation_id || suffix)`. Re-deriving with the same inputs always
/// yields the same id, which is what makes order submission idempotent.
pub fn client_order_id(correlation_id: &str, suffix: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(correlation_id.as_bytes());
    hasher.update(suffix.as_bytes());
    let digest = hasher.finalize();
    format!("HOPE-{}", &hex::encode(digest)[..24])
}

/// Canonical JSON serialization used as input to `event_id`. Kept as a
/// helper so every call site hashes the same representation it publishes.
pub fn canonical_payload<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_id_is_deterministic() {
        let a = client_order_id("corr-1", "entry");
        let b = client_order_id("corr-1", "entry");
        assert_eq!(a, b);
        assert!(a.starts_with("HOPE-"));
        assert_eq!(a.len(), 5 + 24);
    }

    #[test]
    fn client_order_id_differs_by_suffix() {
        let entry = client_order_id("corr-1", "entry");
        let tp = client_order_id("corr-1", "tp");
        let sl = client_order_id("corr-1", "sl");
        assert_ne!(entry, tp);
        assert_ne!(tp, sl);
    }

    #[test]
    fn event_id_changes_with_payload() {
        let ts = Utc::now();
        let a = event_id("Decision", "corr-1", ts, "{\"action\":\"BUY\"}");
        let b = event_id("Decision", "corr-1", ts, "{\"action\":\"SKIP\"}");
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }
}
