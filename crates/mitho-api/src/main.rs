//! Mitho API Server
//!
//! Author: hephaex@gmail.com

use mitho_api::{create_router, state::AppState};
use mitho_core::{AppConfig, LoggingConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "mitho_api={level},audit={level},tower_http=warn,sqlx=warn",
            level = config.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Delete expired refresh tokens every `interval`
fn spawn_token_sweep(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = state.auth.purge_expired().await {
                tracing::warn!(error = %e, "Expired token sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let sweep_interval = config.maintenance.token_sweep_interval_secs;

    // Create application state
    let state = Arc::new(AppState::from_config(config).await?);

    if sweep_interval > 0 {
        spawn_token_sweep(state.clone(), Duration::from_secs(sweep_interval));
    }

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Mitho API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    // Peer addresses key the rate limiter when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
