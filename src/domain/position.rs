//! Open position bookkeeping (spec §3 `Position`, §4.8 watchdog exits).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    PartialTakeProfit,
    Timeout,
    PanicStalePrice,
    PanicApiSilent,
    CircuitBreaker,
    ReconcileGhost,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub schema_version: u32,
    pub id: String,
    pub correlation_id: String,
    pub symbol: String,
    pub entry_order_id: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    /// Quantity still open after partial take-profit fills.
    pub remaining_quantity: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    /// Stop price ratchets up as the trailing stop engages; `None` until the
    /// trailing-activation threshold is crossed (spec §4.8).
    pub trailing_stop_price: Option<Decimal>,
    /// Highest mark price observed since entry; the trailing stop is
    /// computed off this, not off the live price, so it survives a dip
    /// without being recomputed from scratch (spec §4.9).
    pub highest_price_seen: Decimal,
    /// Lowest mark price observed since entry; feeds the Outcome Tracker's
    /// `mae_pct` at close (spec §4.10).
    pub lowest_price_seen: Decimal,
    pub partial_tp_taken: bool,
    pub opened_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl_pct(&self, mark_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (mark_price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED
    }

    /// Updates the high-water mark; returns `true` if `mark_price` improved it.
    pub fn update_high_water_mark(&mut self, mark_price: Decimal) -> bool {
        if mark_price > self.highest_price_seen {
            self.highest_price_seen = mark_price;
            true
        } else {
            false
        }
    }

    /// Updates the low-water mark; returns `true` if `mark_price` lowered it.
    pub fn update_low_water_mark(&mut self, mark_price: Decimal) -> bool {
        if mark_price < self.lowest_price_seen {
            self.lowest_price_seen = mark_price;
            true
        } else {
            false
        }
    }

    /// Maximum favorable/adverse excursion, expressed as percent of entry
    /// price (spec §4.10 `mfe_pct`/`mae_pct`).
    pub fn mfe_pct(&self) -> Decimal {
        self.unrealized_pnl_pct(self.highest_price_seen)
    }

    pub fn mae_pct(&self) -> Decimal {
        self.unrealized_pnl_pct(self.lowest_price_seen)
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        now >= self.timeout_at
    }

    /// Applies a partial take-profit fill: spec §9 decision is "take the
    /// partial first, then re-evaluate the trailing stop on the remaining
    /// quantity" rather than letting a live trailing stop pre-empt the
    /// scheduled partial exit.
    pub fn apply_partial_take_profit(&mut self, filled_qty: Decimal) {
        self.remaining_quantity -= filled_qty;
        self.partial_tp_taken = true;
    }

    pub fn ratchet_trailing_stop(&mut self, candidate: Decimal) {
        let improved = match self.trailing_stop_price {
            Some(current) => candidate > current,
            None => true,
        };
        if improved {
            self.trailing_stop_price = Some(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Position {
        Position {
            schema_version: 1,
            id: "pos-1".into(),
            correlation_id: "corr-1".into(),
            symbol: "PEPEUSDT".into(),
            entry_order_id: "o-1".into(),
            entry_price: dec!(10),
            quantity: dec!(100),
            remaining_quantity: dec!(100),
            tp_price: dec!(12.5),
            sl_price: dec!(9),
            trailing_stop_price: None,
            highest_price_seen: dec!(10),
            lowest_price_seen: dec!(10),
            partial_tp_taken: false,
            opened_at: Utc::now(),
            timeout_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn trailing_stop_never_ratchets_down() {
        let mut p = sample();
        p.ratchet_trailing_stop(dec!(10.5));
        p.ratchet_trailing_stop(dec!(10.2));
        assert_eq!(p.trailing_stop_price, Some(dec!(10.5)));
    }

    #[test]
    fn partial_take_profit_reduces_remaining_quantity_only() {
        let mut p = sample();
        p.apply_partial_take_profit(dec!(40));
        assert_eq!(p.remaining_quantity, dec!(60));
        assert_eq!(p.quantity, dec!(100));
        assert!(p.partial_tp_taken);
    }

    #[test]
    fn unrealized_pnl_pct_is_signed() {
        let p = sample();
        assert_eq!(p.unrealized_pnl_pct(dec!(9)), dec!(-10));
    }

    #[test]
    fn high_water_mark_only_moves_up() {
        let mut p = sample();
        assert!(p.update_high_water_mark(dec!(11)));
        assert!(!p.update_high_water_mark(dec!(10.5)));
        assert_eq!(p.highest_price_seen, dec!(11));
    }

    #[test]
    fn low_water_mark_only_moves_down() {
        let mut p = sample();
        assert!(p.update_low_water_mark(dec!(9)));
        assert!(!p.update_low_water_mark(dec!(9.5)));
        assert_eq!(p.lowest_price_seen, dec!(9));
    }

    #[test]
    fn mfe_and_mae_are_signed_against_entry() {
        let mut p = sample();
        p.update_high_water_mark(dec!(11));
        p.update_low_water_mark(dec!(9));
        assert_eq!(p.mfe_pct(), dec!(10));
        assert_eq!(p.mae_pct(), dec!(-10));
    }
}
