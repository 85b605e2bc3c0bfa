//! Closed-trade records consumed by the Outcome Tracker (spec §3 `Outcome`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::position::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeLabel {
    Win,
    Loss,
    Flat,
}

impl std::fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutcomeLabel::Win => "WIN",
            OutcomeLabel::Loss => "LOSS",
            OutcomeLabel::Flat => "FLAT",
        })
    }
}

impl OutcomeLabel {
    pub fn from_pnl(pnl_usd: Decimal) -> Self {
        if pnl_usd > Decimal::ZERO {
            OutcomeLabel::Win
        } else if pnl_usd < Decimal::ZERO {
            OutcomeLabel::Loss
        } else {
            OutcomeLabel::Flat
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub schema_version: u32,
    pub id: String,
    pub correlation_id: String,
    pub symbol: String,
    pub position_id: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_pct: Decimal,
    /// Best unrealized excursion reached before close, as percent of entry.
    pub mfe_pct: Decimal,
    /// Worst unrealized excursion reached before close, as percent of entry.
    pub mae_pct: Decimal,
    pub duration_sec: i64,
    pub exit_reason: ExitReason,
    pub label: OutcomeLabel,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        self.pnl_usd > Decimal::ZERO
    }

    pub fn hold_duration(&self) -> chrono::Duration {
        self.closed_at - self.opened_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(pnl_usd: Decimal) -> Outcome {
        Outcome {
            schema_version: 1,
            id: "out-1".into(),
            correlation_id: "corr-1".into(),
            symbol: "PEPEUSDT".into(),
            position_id: "pos-1".into(),
            entry_price: dec!(10),
            exit_price: dec!(10),
            quantity: dec!(100),
            pnl_usd,
            pnl_pct: dec!(0),
            mfe_pct: dec!(0),
            mae_pct: dec!(0),
            duration_sec: 60,
            exit_reason: ExitReason::Timeout,
            label: OutcomeLabel::from_pnl(pnl_usd),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn zero_pnl_is_not_a_win() {
        let o = sample(dec!(0));
        assert!(!o.is_win());
        assert_eq!(o.label, OutcomeLabel::Flat);
    }

    #[test]
    fn positive_pnl_labels_win() {
        assert_eq!(sample(dec!(5)).label, OutcomeLabel::Win);
    }

    #[test]
    fn negative_pnl_labels_loss() {
        assert_eq!(sample(dec!(-5)).label, OutcomeLabel::Loss);
    }
}
