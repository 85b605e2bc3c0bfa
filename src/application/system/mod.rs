//! Top-level orchestrator: composes the bootstrap stages, serves the HTTP
//! surface, and registers the shutdown handler.

pub mod shutdown;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::application::bootstrap::agents::{AgentsBootstrap, AgentsHandle};
use crate::application::bootstrap::persistence::{PersistenceBootstrap, PersistenceHandle};
use crate::application::bootstrap::services::{ServicesBootstrap, ServicesHandle};
use crate::application::system::shutdown::{ShutdownConfig, ShutdownHandle, ShutdownSequence};
use crate::config::Config;
use crate::interfaces::http::{self, AppState};

pub struct Application {
    config: Config,
    persistence: PersistenceHandle,
    services: ServicesHandle,
    agents: AgentsHandle,
    shutdown_handle: ShutdownHandle,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(mode = ?config.mode, "building application");

        let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
        let services = ServicesBootstrap::init(&config).await.context("services bootstrap failed")?;
        let persistence = PersistenceBootstrap::init(&config, services.notifier.clone())
            .await
            .context("persistence bootstrap failed")?;
        let agents = AgentsBootstrap::init(&config, &persistence, &services, shutdown_signal)
            .await
            .context("agent bootstrap failed")?;

        Ok(Self { config, persistence, services, agents, shutdown_handle })
    }

    pub async fn start(self) -> Result<()> {
        let state = AppState {
            health_service: self.agents.health_service.clone(),
            book: self.agents.book.clone(),
            risk_snapshot: self.agents.risk_snapshot.clone(),
            event_repo: self.persistence.event_repo.clone(),
            risk_cmd_tx: self.agents.risk_cmd_tx.clone(),
            signal_tx: self.agents.signal_tx.clone(),
        };
        let router = http::router(state);

        let listener = TcpListener::bind(&self.config.http_bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.http_bind_addr))?;
        info!(addr = %self.config.http_bind_addr, "HTTP surface listening");

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP server terminated: {}", e);
            }
        });

        let flatten_on_exit = std::env::var("FLATTEN_ON_EXIT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
        info!("received shutdown signal");
        server.abort();
        self.shutdown_handle.trigger();

        let sequence = ShutdownSequence::new(
            self.services.exchange.clone(),
            self.agents.book.clone(),
            self.agents.risk.clone(),
            self.config.symbols.clone(),
            ShutdownConfig { flatten_on_exit },
            self.services.notifier.clone(),
            self.persistence.event_repo.clone(),
        );
        sequence.run().await;

        Ok(())
    }
}
