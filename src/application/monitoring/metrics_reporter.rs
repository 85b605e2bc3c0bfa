//! Periodic `METRICS_JSON:{...}` log line (spec §A.5). Reads the gauges that
//! live in shared application state (open positions, circuit state) and
//! folds them in with the plain counters `infrastructure::observability`
//! tracks on its own.

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::agents::position_tracker::PositionBook;
use crate::application::risk_management::circuit_breaker_service::{CircuitBreakerService, CircuitState};
use crate::application::system::shutdown::ShutdownSignal;
use crate::infrastructure::observability::Metrics;

pub struct MetricsReporter {
    metrics: Metrics,
    book: PositionBook,
    circuit: std::sync::Arc<RwLock<CircuitBreakerService>>,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, book: PositionBook, circuit: std::sync::Arc<RwLock<CircuitBreakerService>>) -> Self {
        Self { metrics, book, circuit }
    }

    pub async fn run(self, mut period: tokio::time::Interval, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = period.tick() => {
                    self.report().await;
                }
                _ = shutdown.triggered() => {
                    warn!("metrics reporter stopping on shutdown signal");
                    break;
                }
            }
        }
    }

    async fn report(&self) {
        let open_positions = self.book.count().await;
        let circuit_state = match self.circuit.read().await.state() {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        let snapshot = self.metrics.snapshot(open_positions, circuit_state.to_string());
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!("METRICS_JSON:{}", json),
            Err(e) => warn!("failed to serialize metrics snapshot: {}", e),
        }
    }
}
