//! Inbound trading hints (spec §3 `Signal`) and their normalization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyTag {
    Pump,
    Momentum24h,
    Trending,
    Explosion,
    Other,
}

/// Raw signal as received from a Signal Source collaborator (in-process
/// channel or `POST /ingest/signal`). Fields map 1:1 onto spec §3; this is
/// the "tagged record with an explicit `strategy_tag` variant" design note
/// (spec §9) rather than a duck-typed JSON blob flowing through the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub schema_version: u32,
    pub id: String,
    pub correlation_id: String,
    pub symbol: String,
    pub strategy_tag: StrategyTag,
    pub price: Decimal,
    pub delta_pct: f64,
    pub buys_per_sec: Option<f64>,
    pub vol_raise_pct: Option<f64>,
    pub daily_volume_usd: Decimal,
    pub produced_at: DateTime<Utc>,
}

impl Signal {
    /// Structural validation only (guard 1, "Schema"). Range/TTL/liquidity
    /// checks live in the Signal Gate, which needs collaborators (Price
    /// Cache, clock) this type doesn't have access to.
    pub fn validate_schema(&self) -> Result<(), String> {
        if self.symbol.is_empty() || self.symbol != self.symbol.to_uppercase() {
            return Err("symbol must be non-empty uppercase".into());
        }
        if self.price <= Decimal::ZERO {
            return Err("price must be > 0".into());
        }
        if self.daily_volume_usd < Decimal::ZERO {
            return Err("daily_volume_usd must be >= 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Signal {
        Signal {
            schema_version: 1,
            id: "sig-1".into(),
            correlation_id: "corr-1".into(),
            symbol: "PEPEUSDT".into(),
            strategy_tag: StrategyTag::Explosion,
            price: dec!(0.00001),
            delta_pct: 15.0,
            buys_per_sec: Some(5.0),
            vol_raise_pct: Some(60.0),
            daily_volume_usd: dec!(50_000_000),
            produced_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_lowercase_symbol() {
        let mut s = sample();
        s.symbol = "pepeusdt".into();
        assert!(s.validate_schema().is_err());
    }

    #[test]
    fn rejects_nonpositive_price() {
        let mut s = sample();
        s.price = dec!(0);
        assert!(s.validate_schema().is_err());
    }

    #[test]
    fn accepts_valid_signal() {
        assert!(sample().validate_schema().is_ok());
    }
}
