//! Position size computation (spec §4.6 "Position size").

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy)]
pub struct SizingConfig {
    pub base_pct: Decimal,
    pub min_size_usd: Decimal,
    pub max_size_usd: Decimal,
    pub max_exposure_pct: Decimal,
    pub compound_baseline_equity: Decimal,
}

pub struct SizingEngine {
    config: SizingConfig,
}

impl SizingEngine {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    fn confidence_multiplier(confidence: f64) -> Decimal {
        if confidence >= 0.85 {
            dec!(1.25)
        } else if confidence >= 0.75 {
            dec!(1.00)
        } else if confidence >= 0.65 {
            dec!(0.75)
        } else {
            dec!(0.50)
        }
    }

    fn loss_adjust(consecutive_losses: usize) -> Decimal {
        match consecutive_losses {
            0 => dec!(1.00),
            1 => dec!(1.00),
            2 => dec!(0.75),
            _ => dec!(0.50),
        }
    }

    /// Steps up 0.05 per 10% equity growth above `compound_baseline_equity`,
    /// capped at 1.50.
    fn compound_multiplier(&self, current_equity: Decimal) -> Decimal {
        if self.config.compound_baseline_equity <= Decimal::ZERO {
            return Decimal::ONE;
        }
        let growth_pct = (current_equity - self.config.compound_baseline_equity)
            .checked_div(self.config.compound_baseline_equity)
            .unwrap_or(Decimal::ZERO);
        if growth_pct <= Decimal::ZERO {
            return Decimal::ONE;
        }
        let steps = (growth_pct / dec!(0.10)).floor();
        (Decimal::ONE + steps * dec!(0.05)).min(dec!(1.50))
    }

    /// `size_usd`, already clamped to `[min_size, max_size]` and to the
    /// remaining exposure headroom; `None` when no headroom remains at all.
    pub fn position_size_usd(
        &self,
        balance: Decimal,
        confidence: f64,
        consecutive_losses: usize,
        open_notional_usd: Decimal,
    ) -> Option<Decimal> {
        let raw = balance
            * self.config.base_pct
            * Self::confidence_multiplier(confidence)
            * Self::loss_adjust(consecutive_losses)
            * self.compound_multiplier(balance);

        let clamped = raw.clamp(self.config.min_size_usd, self.config.max_size_usd);

        let max_total = balance * self.config.max_exposure_pct;
        let headroom = (max_total - open_notional_usd).max(Decimal::ZERO);
        if headroom <= Decimal::ZERO {
            return None;
        }
        Some(clamped.min(headroom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SizingConfig {
        SizingConfig {
            base_pct: dec!(0.02),
            min_size_usd: dec!(10),
            max_size_usd: dec!(500),
            max_exposure_pct: dec!(0.30),
            compound_baseline_equity: dec!(10_000),
        }
    }

    #[test]
    fn high_confidence_uses_top_multiplier() {
        let engine = SizingEngine::new(config());
        let size = engine
            .position_size_usd(dec!(10_000), 0.90, 0, Decimal::ZERO)
            .unwrap();
        assert_eq!(size, dec!(250)); // 10000*0.02*1.25
    }

    #[test]
    fn three_consecutive_losses_halves_size() {
        let engine = SizingEngine::new(config());
        let size = engine
            .position_size_usd(dec!(10_000), 0.90, 3, Decimal::ZERO)
            .unwrap();
        assert_eq!(size, dec!(125)); // 10000*0.02*1.25*0.50
    }

    #[test]
    fn exposure_headroom_clamps_size() {
        let engine = SizingEngine::new(config());
        let size = engine
            .position_size_usd(dec!(10_000), 0.90, 0, dec!(2_950))
            .unwrap();
        assert_eq!(size, dec!(50)); // headroom = 3000 - 2950
    }

    #[test]
    fn no_headroom_returns_none() {
        let engine = SizingEngine::new(config());
        assert!(
            engine
                .position_size_usd(dec!(10_000), 0.90, 0, dec!(3_000))
                .is_none()
        );
    }
}
