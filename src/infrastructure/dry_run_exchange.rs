//! `ExchangeRest` decorator for `Mode::Dry` (spec §6 "MODE ... effect:
//! choose exchange base URL and whether orders are submitted"). Market-data
//! reads (order book, 24h volume) are forwarded to a real exchange client
//! so the rest of the pipeline sees genuine prices and liquidity; every
//! order-placing call is simulated against the current order book instead
//! of reaching the exchange, and a simple in-memory ledger stands in for
//! account balances.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::order::{Order, OrderSide};
use crate::domain::ports::{AccountBalances, ExchangeRest, OrderBookTop, OrderFill};

pub struct DryRunExchange {
    inner: Arc<dyn ExchangeRest>,
    quote_asset: String,
    equity: Mutex<Decimal>,
}

impl DryRunExchange {
    pub fn new(inner: Arc<dyn ExchangeRest>, starting_balance: Decimal) -> Self {
        Self { inner, quote_asset: "USDT".to_string(), equity: Mutex::new(starting_balance) }
    }
}

#[async_trait]
impl ExchangeRest for DryRunExchange {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderFill> {
        let top = self.inner.order_book_top(symbol).await?;
        let fill_price = match side {
            OrderSide::Buy => top.best_ask,
            OrderSide::Sell => top.best_bid,
        };
        let notional = fill_price * quantity;
        let mut equity = self.equity.lock().await;
        *equity += match side {
            OrderSide::Buy => -notional,
            OrderSide::Sell => notional,
        };
        info!(%symbol, %client_order_id, %fill_price, "dry run: simulated market fill");
        Ok(OrderFill { filled_quantity: quantity, avg_price: fill_price })
    }

    async fn place_ioc_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
        client_order_id: &str,
    ) -> Result<Option<OrderFill>> {
        let top = self.inner.order_book_top(symbol).await?;
        let crosses = match side {
            OrderSide::Buy => top.best_ask <= limit_price,
            OrderSide::Sell => top.best_bid >= limit_price,
        };
        if !crosses {
            return Ok(None);
        }
        self.place_market_order(symbol, side, quantity, client_order_id).await.map(Some)
    }

    async fn place_oco_exit(
        &self,
        symbol: &str,
        _quantity: Decimal,
        take_profit_price: Decimal,
        stop_price: Decimal,
        _stop_limit_price: Decimal,
        client_order_id: &str,
    ) -> Result<()> {
        info!(%symbol, %client_order_id, %take_profit_price, %stop_price, "dry run: simulated OCO exit placed");
        Ok(())
    }

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<()> {
        info!(%symbol, %client_order_id, "dry run: simulated cancel");
        Ok(())
    }

    async fn order_book_top(&self, symbol: &str) -> Result<OrderBookTop> {
        self.inner.order_book_top(symbol).await
    }

    async fn account_balances(&self) -> Result<AccountBalances> {
        let equity = *self.equity.lock().await;
        Ok(AccountBalances { quote_asset: self.quote_asset.clone(), free: equity, locked: Decimal::ZERO })
    }

    async fn open_orders(&self, _symbols: &[String]) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }

    async fn exchange_info_24h_volume(&self) -> Result<HashMap<String, Decimal>> {
        self.inner.exchange_info_24h_volume().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct StubExchange;

    #[async_trait]
    impl ExchangeRest for StubExchange {
        async fn place_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: &str) -> Result<OrderFill> {
            unreachable!("dry run should never forward order placement")
        }
        async fn place_ioc_limit_order(&self, _: &str, _: OrderSide, _: Decimal, _: Decimal, _: &str) -> Result<Option<OrderFill>> {
            unreachable!()
        }
        async fn place_oco_exit(&self, _: &str, _: Decimal, _: Decimal, _: Decimal, _: Decimal, _: &str) -> Result<()> {
            unreachable!()
        }
        async fn cancel_order(&self, _: &str, _: &str) -> Result<()> {
            unreachable!()
        }
        async fn order_book_top(&self, _symbol: &str) -> Result<OrderBookTop> {
            Ok(OrderBookTop { best_bid: dec!(100), best_ask: dec!(101) })
        }
        async fn account_balances(&self) -> Result<AccountBalances> {
            unreachable!()
        }
        async fn open_orders(&self, _symbols: &[String]) -> Result<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn exchange_info_24h_volume(&self) -> Result<HashMap<String, Decimal>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn market_buy_debits_simulated_equity_at_best_ask() {
        let dry = DryRunExchange::new(Arc::new(StubExchange), dec!(1000));
        let fill = dry.place_market_order("BTCUSDT", OrderSide::Buy, dec!(2), "cid-1").await.unwrap();
        assert_eq!(fill.avg_price, dec!(101));
        let balance = dry.account_balances().await.unwrap();
        assert_eq!(balance.free, dec!(1000) - dec!(202));
    }

    #[tokio::test]
    async fn ioc_limit_buy_rejects_when_ask_above_limit() {
        let dry = DryRunExchange::new(Arc::new(StubExchange), dec!(1000));
        let fill = dry.place_ioc_limit_order("BTCUSDT", OrderSide::Buy, dec!(1), dec!(100), "cid-1").await.unwrap();
        assert!(fill.is_none());
    }
}
