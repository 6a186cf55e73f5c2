mod api;
mod bootstrap;
mod generation;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cantina_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use cantina_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let generation_client = generation::HttpGenerationClient::from_config(&app.config.llm)?;
    let state = api::ApiState::new(
        app.db_pool.clone(),
        Arc::new(generation_client),
        app.config.session.clone(),
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        session_id = "unknown",
        bind_address = %address,
        "cantina-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(wait_for_shutdown(grace))
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        session_id = "unknown",
        "cantina-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!(
        event_name = "system.server.shutdown_signal",
        correlation_id = "shutdown",
        session_id = "unknown",
        grace_secs = grace.as_secs(),
        "shutdown signal received, draining in-flight requests"
    );
}
