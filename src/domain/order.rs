//! Order intent and lifecycle (spec §3 `Order`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    /// IOC limit used for the initial entry attempt before falling back to
    /// MARKET (spec §4.7 step 2).
    IocLimit,
    /// Limit leg of an OCO pair (take-profit).
    OcoTakeProfit,
    /// Stop-loss-limit leg of an OCO pair.
    OcoStopLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    PartiallyFilled,
    Rejected,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub schema_version: u32,
    pub id: String,
    pub client_order_id: String,
    pub correlation_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub entry_price_hint: Decimal,
    pub tp_price: Option<Decimal>,
    pub sl_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub rejection_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Order {
    pub fn new_entry(
        correlation_id: &str,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        entry_price_hint: Decimal,
        kind: OrderKind,
    ) -> Self {
        Self {
            schema_version: 1,
            id: crate::domain::ids::client_order_id(correlation_id, "entry"),
            client_order_id: crate::domain::ids::client_order_id(correlation_id, "entry"),
            correlation_id: correlation_id.to_string(),
            symbol: symbol.to_string(),
            side,
            kind,
            quantity,
            entry_price_hint,
            tp_price: None,
            sl_price: None,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            rejection_reason: None,
            created_at: crate::domain::ids::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Canceled
        )
    }
}
