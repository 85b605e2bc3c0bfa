//! Adaptive TP/SL target computation from ATR (spec §4.6 "Targets").

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::domain::decision::SignalTier;
use crate::domain::ports::Candle;

#[derive(Debug, Clone, Copy)]
pub struct TargetConfig {
    pub k_tp: Decimal,
    pub k_sl: Decimal,
    pub floor_tp_pct: Decimal,
    pub floor_sl_pct: Decimal,
    pub max_tp_pct: Decimal,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            k_tp: dec!(3.0),
            k_sl: dec!(1.5),
            floor_tp_pct: dec!(1.0),
            floor_sl_pct: dec!(0.5),
            max_tp_pct: dec!(15.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Targets {
    pub tp_pct: Decimal,
    pub sl_pct: Decimal,
}

pub struct TargetEngine {
    config: TargetConfig,
}

impl TargetEngine {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    /// Wilder-style ATR over `candles` (oldest first); `None` if fewer than
    /// 2 candles are supplied.
    pub fn atr(candles: &[Candle]) -> Option<Decimal> {
        if candles.len() < 2 {
            return None;
        }
        let mut sum = Decimal::ZERO;
        let mut n = 0u32;
        for window in candles.windows(2) {
            let (prev, cur) = (window[0], window[1]);
            let true_range = (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs());
            sum += true_range;
            n += 1;
        }
        if n == 0 {
            None
        } else {
            Some(sum / Decimal::from(n))
        }
    }

    /// Computes TP/SL percentages, widening TP to satisfy the tier's
    /// minimum reward:risk ratio. Returns `None` if satisfying the ratio
    /// would push TP past `max_tp_pct` (spec §4.6: "if that would exceed
    /// max_tp_pct, SKIP").
    pub fn compute(&self, entry_price: Decimal, atr: Decimal, tier: SignalTier) -> Option<Targets> {
        if entry_price <= Decimal::ZERO {
            return None;
        }
        let atr_pct = (atr / entry_price) * dec!(100);

        let tp_pct = (self.config.k_tp * atr_pct).max(self.config.floor_tp_pct);
        let sl_pct = (self.config.k_sl * atr_pct).max(self.config.floor_sl_pct);

        let min_rr = tier.min_risk_reward();
        let required_tp = sl_pct * min_rr;
        let tp_pct = tp_pct.max(required_tp);

        if tp_pct > self.config.max_tp_pct {
            return None;
        }

        Some(Targets { tp_pct, sl_pct })
    }

    pub fn to_prices(entry_price: Decimal, targets: Targets) -> (Decimal, Decimal) {
        let tp_price = entry_price * (Decimal::ONE + targets.tp_pct / dec!(100));
        let sl_price = entry_price * (Decimal::ONE - targets.sl_pct / dec!(100));
        (tp_price, sl_price)
    }
}

impl Targets {
    pub fn risk_reward(&self) -> f64 {
        if self.sl_pct.is_zero() {
            0.0
        } else {
            (self.tp_pct / self.sl_pct).to_f64().unwrap_or(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_tp_to_satisfy_tier_floor() {
        let engine = TargetEngine::new(TargetConfig::default());
        // atr_pct tiny -> tp/sl both hit their floors (1.0 / 0.5 = 2.0 < 2.5)
        let targets = engine
            .compute(dec!(100), dec!(0.01), SignalTier::Strong)
            .unwrap();
        assert_eq!(targets.sl_pct, dec!(0.5));
        assert_eq!(targets.tp_pct, dec!(1.25)); // 0.5 * 2.5
    }

    #[test]
    fn skips_when_required_tp_exceeds_max() {
        let mut config = TargetConfig::default();
        config.max_tp_pct = dec!(1.0);
        let engine = TargetEngine::new(config);
        assert!(engine.compute(dec!(100), dec!(0.01), SignalTier::Strong).is_none());
    }

    #[test]
    fn momentum_tier_needs_smaller_tp_widening() {
        let engine = TargetEngine::new(TargetConfig::default());
        let targets = engine
            .compute(dec!(100), dec!(0.01), SignalTier::Momentum)
            .unwrap();
        assert_eq!(targets.tp_pct, dec!(0.75)); // 0.5 * 1.5
    }
}
