//! # Store API Server
//!
//! Binary entry point: load config, open the database, serve HTTP.

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_db::{Database, DbConfig};
use tally_store_api::{build_router, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Tally store API...");

    let config = ApiConfig::load()?;
    info!(
        port = config.port,
        database = %config.database_path,
        branch = %config.default_branch_id,
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready, migrations applied");

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let app = build_router(AppState::new(db, config));

    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
