//! Decision Engine output types (spec §3 `Decision`, §4.6).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalTier {
    Strong,
    Medium,
    Weak,
    Momentum,
    Noise,
}

impl SignalTier {
    /// Minimum confidence required for this tier to be eligible for BUY
    /// (spec §4.6 tier selection thresholds / spec §8 tier-boundary tests).
    pub fn confidence_threshold(self) -> f64 {
        match self {
            SignalTier::Strong => 0.65,
            SignalTier::Medium => 0.50,
            SignalTier::Weak => 0.35,
            SignalTier::Momentum => 0.35,
            SignalTier::Noise => 1.1, // unreachable: NOISE always -> SKIP
        }
    }

    /// Minimum reward:risk ratio this tier must satisfy (spec §3 invariant,
    /// §4.6 targets: "enforce tp_pct/sl_pct >= 2.5 (>= 1.5 for MOMENTUM)").
    pub fn min_risk_reward(self) -> Decimal {
        if matches!(self, SignalTier::Momentum) {
            Decimal::new(15, 1) // 1.5
        } else {
            Decimal::new(25, 1) // 2.5
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub schema_version: u32,
    pub correlation_id: String,
    pub symbol: String,
    pub alpha_confidence: f64,
    pub risk_approved: bool,
    pub risk_reasons: Vec<String>,
    pub action: Action,
    pub confidence: f64,
    /// Signal price at decision time; the Order Executor's "never cross by
    /// more than 0.3%" guard (spec §4.7) is measured against this, not the
    /// live orderbook, so a stale-by-the-time-it-executes signal can't walk
    /// the price arbitrarily far from what Alpha/Risk actually evaluated.
    pub entry_price_hint: Decimal,
    pub position_size_usd: Decimal,
    pub tp_pct: Decimal,
    pub sl_pct: Decimal,
    pub timeout_sec: u64,
    pub signal_tier: SignalTier,
    pub skip_reasons: Vec<String>,
}

impl Decision {
    pub fn risk_reward(&self) -> Decimal {
        if self.sl_pct.is_zero() {
            Decimal::ZERO
        } else {
            self.tp_pct / self.sl_pct
        }
    }

    /// Spec §3 invariant: `action=BUY` implies guards passed, confidence
    /// meets the tier threshold, and R:R clears the tier floor.
    pub fn is_valid_buy(&self) -> bool {
        if self.action != Action::Buy {
            return true; // invariant only binds BUY decisions
        }
        self.risk_approved
            && self.confidence >= self.signal_tier.confidence_threshold()
            && self.risk_reward() >= self.signal_tier.min_risk_reward()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_decision(tp_pct: Decimal, sl_pct: Decimal, tier: SignalTier, confidence: f64) -> Decision {
        Decision {
            schema_version: 1,
            correlation_id: "c".into(),
            symbol: "PEPEUSDT".into(),
            alpha_confidence: confidence,
            risk_approved: true,
            risk_reasons: vec![],
            action: Action::Buy,
            confidence,
            entry_price_hint: dec!(1.0),
            position_size_usd: dec!(100),
            tp_pct,
            sl_pct,
            timeout_sec: 3600,
            signal_tier: tier,
            skip_reasons: vec![],
        }
    }

    #[test]
    fn rr_exactly_at_boundary_passes() {
        let d = buy_decision(dec!(2.5), dec!(1.0), SignalTier::Strong, 0.8);
        assert!(d.is_valid_buy());
    }

    #[test]
    fn rr_just_under_boundary_fails() {
        let d = buy_decision(dec!(2.499), dec!(1.0), SignalTier::Strong, 0.8);
        assert!(!d.is_valid_buy());
    }

    #[test]
    fn momentum_tier_uses_lower_floor() {
        let d = buy_decision(dec!(1.5), dec!(1.0), SignalTier::Momentum, 0.5);
        assert!(d.is_valid_buy());
        let below = buy_decision(dec!(1.4), dec!(1.0), SignalTier::Momentum, 0.5);
        assert!(!below.is_valid_buy());
    }

    #[test]
    fn confidence_below_tier_threshold_fails() {
        let d = buy_decision(dec!(3.0), dec!(1.0), SignalTier::Strong, 0.60);
        assert!(!d.is_valid_buy());
    }
}
