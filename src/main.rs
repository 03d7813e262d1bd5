use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bi_admin_api::app::{app, AppState};
use bi_admin_api::config::config;
use bi_admin_api::database::{DatabaseManager, PgStore};
use bi_admin_api::is_production;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    tracing::info!("Starting BI Admin API in {:?} mode", config.environment);

    if is_production!() && config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in production");
    }

    let manager = DatabaseManager::from_config().context("failed to configure database pool")?;
    let store = Arc::new(PgStore::from_manager(&manager));
    let state = AppState::new(store, config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("BI Admin API listening on http://{}", bind_addr);

    let service = app(state, config).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
