// Temp-write-fsync-rename primitives shared by every file-backed adapter
pub mod atomic_file;

// Binance REST adapter: ExchangeRest + PriceHistory
pub mod binance_exchange;

// Binance combined-stream websocket adapter: PriceFeed
pub mod binance_price_feed;

// Pre-trained SignalClassifier with SHA-256 registry verification
pub mod classifier;

// ExchangeRest decorator simulating fills for Mode::Dry
pub mod dry_run_exchange;

// Append-only JSONL EventRepository
pub mod event_log;

// EventListener implementors fed by FileEventLog's fan-out dispatch
pub mod event_listeners;

// Webhook Notifier
pub mod notifier;

// Alternative.me Fear & Greed SentimentProvider
pub mod sentiment;

// Environment-backed SecretsProvider
pub mod secrets;

// In-process counters pushed as METRICS_JSON log lines
pub mod observability;

// JSON-file RiskStateRepository / PositionRepository / AllowListRepository
pub mod state_repositories;
