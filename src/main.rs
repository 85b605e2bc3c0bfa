use hope::application::system::Application;
use hope::config::Config;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("starting HOPE trading service");

    let config = Config::from_env().map_err(|e| {
        error!("failed to load config: {}", e);
        e
    })?;

    let app = Application::build(config).await.map_err(|e| {
        error!("failed to build application: {}", e);
        e
    })?;

    app.start().await.map_err(|e| {
        error!("application exited with error: {}", e);
        e
    })?;

    info!("HOPE trading service stopped");
    Ok(())
}
