//! Exchange, price feed, classifier, sentiment and notifier adapter wiring
//! (spec §6 "MODE"). `Mode::Dry` wraps the real exchange client in
//! `DryRunExchange` so market-data reads stay genuine while order placement
//! is simulated.

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, Mode};
use crate::domain::ports::{ExchangeRest, Notifier, PriceFeed, PriceHistory, SecretsProvider, SentimentProvider, SignalClassifier};
use crate::infrastructure::binance_exchange::BinanceExchange;
use crate::infrastructure::binance_price_feed::BinanceWebsocketPriceFeed;
use crate::infrastructure::classifier;
use crate::infrastructure::dry_run_exchange::DryRunExchange;
use crate::infrastructure::notifier::WebhookNotifier;
use crate::infrastructure::secrets::EnvSecretsProvider;
use crate::infrastructure::sentiment::FearGreedSentimentProvider;

pub struct ServicesHandle {
    pub exchange: Arc<dyn ExchangeRest>,
    pub price_history: Arc<dyn PriceHistory>,
    pub price_feed: Arc<dyn PriceFeed>,
    pub classifier: Arc<dyn SignalClassifier>,
    pub sentiment: Arc<dyn SentimentProvider>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub async fn init(config: &Config) -> Result<ServicesHandle> {
        let secrets: Arc<dyn SecretsProvider> =
            Arc::new(EnvSecretsProvider::new(config.exchange_key.clone(), config.exchange_secret.clone()));

        let rest_base_url = config.mode.exchange_rest_base_url().to_string();
        let (api_key, api_secret) = match config.mode {
            Mode::Dry => (String::new(), String::new()),
            Mode::Testnet | Mode::Live => (secrets.exchange_api_key()?, secrets.exchange_api_secret()?),
        };

        let binance = Arc::new(BinanceExchange::new(api_key, api_secret, rest_base_url));

        let exchange: Arc<dyn ExchangeRest> = if config.mode == Mode::Dry {
            Arc::new(DryRunExchange::new(binance.clone(), config.dry_run_starting_balance_usd))
        } else {
            binance.clone()
        };

        let price_history: Arc<dyn PriceHistory> = binance;
        let price_feed: Arc<dyn PriceFeed> =
            Arc::new(BinanceWebsocketPriceFeed::new(config.mode.exchange_ws_base_url().to_string()));

        let model_path = std::path::PathBuf::from(&config.model_path);
        let signal_classifier = classifier::load_or_neutral(&model_path, &config.model_allowed_hashes);

        let sentiment: Arc<dyn SentimentProvider> = Arc::new(FearGreedSentimentProvider::new());
        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(config.webhook_url.clone()));

        Ok(ServicesHandle {
            exchange,
            price_history,
            price_feed,
            classifier: signal_classifier,
            sentiment,
            notifier,
        })
    }
}
