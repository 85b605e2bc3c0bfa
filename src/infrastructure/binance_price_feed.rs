//! `PriceFeed` adapter over Binance's combined trade-stream websocket. The
//! reconnect loop (exponential backoff, capped at 60s) and combined-stream
//! URL shape mirror the existing Binance websocket manager; this adapter's
//! entire job is forwarding ticks into the Price Cache via `on_tick`, not
//! maintaining any state of its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::domain::ports::{PriceFeed, PriceTick};

pub struct BinanceWebsocketPriceFeed {
    ws_url: String,
}

impl BinanceWebsocketPriceFeed {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl PriceFeed for BinanceWebsocketPriceFeed {
    async fn run(&self, symbols: Vec<String>, on_tick: Sender<PriceTick>) -> Result<()> {
        if symbols.is_empty() {
            anyhow::bail!("price feed started with no symbols to subscribe to");
        }

        let mut backoff = 1u64;
        const MAX_BACKOFF: u64 = 60;

        loop {
            match connect_and_stream(&self.ws_url, &symbols, &on_tick).await {
                Ok(()) => {
                    info!("binance price feed connection closed gracefully, reconnecting");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    backoff = 1;
                }
                Err(e) => {
                    error!("binance price feed error: {}, reconnecting in {}s", e, backoff);
                    tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
            if on_tick.is_closed() {
                return Ok(());
            }
        }
    }
}

async fn connect_and_stream(ws_url: &str, symbols: &[String], on_tick: &Sender<PriceTick>) -> Result<()> {
    let streams: Vec<String> = symbols.iter().map(|s| format!("{}@trade", s.to_lowercase())).collect();
    let url = format!("{}/stream?streams={}", ws_url.trim_end_matches('/'), streams.join("/"));

    info!("connecting to binance price feed: {}", url);
    let (ws_stream, _) = connect_async(&url).await.context("failed to connect to binance websocket")?;
    let (mut write, mut read) = ws_stream.split();

    let (ping_tx, mut ping_rx) = tokio::sync::mpsc::channel::<Message>(8);
    let pinger = ping_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(180));
        loop {
            interval.tick().await;
            if pinger.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            Some(msg) = ping_rx.recv() => {
                if write.send(msg).await.is_err() {
                    return Ok(());
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_message(&text, on_tick).await {
                            if !text.contains("\"result\":null") {
                                warn!("failed to handle binance price feed message: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("binance price feed closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(anyhow::anyhow!("websocket read error: {}", e)),
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn handle_message(text: &str, on_tick: &Sender<PriceTick>) -> Result<()> {
    #[derive(Deserialize)]
    struct StreamMessage {
        stream: String,
        data: serde_json::Value,
    }
    #[derive(Deserialize)]
    struct TradeData {
        #[serde(rename = "p")]
        price: String,
        #[serde(rename = "T")]
        trade_time_ms: i64,
    }

    let msg: StreamMessage = serde_json::from_str(text)?;
    let Some(symbol) = msg.stream.strip_suffix("@trade") else {
        return Ok(());
    };
    let symbol = symbol.to_uppercase();
    let trade: TradeData = serde_json::from_value(msg.data)?;
    let price: Decimal = trade.price.parse().context("failed to parse trade price")?;
    let exchange_time = chrono::DateTime::from_timestamp_millis(trade.trade_time_ms)
        .unwrap_or_else(chrono::Utc::now);

    if on_tick.send(PriceTick { symbol, price, exchange_time }).await.is_err() {
        anyhow::bail!("price tick receiver dropped");
    }
    Ok(())
}
