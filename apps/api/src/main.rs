//! # Apotek API
//!
//! HTTP server for the prescription workflow.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Apotek API Server                              │
//! │                                                                         │
//! │  Web client ───► HTTP (axum) ───► PrescriptionService ───► SQLite       │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                   static/prescription                   │
//! │                                   static/eticket (PDF)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apotek_api::services::artifact;
use apotek_api::{router, ApiConfig, AppState};
use apotek_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("apotek_api=debug,apotek_db=info,tower_http=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Apotek API server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        address = %config.bind_address(),
        database = %config.database_path.display(),
        static_dir = %config.static_dir.display(),
        "Configuration loaded"
    );

    // Connect to database (migrations run on connect)
    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = Database::new(
        DbConfig::new(config.database_path.clone()).max_connections(config.db_max_connections),
    )
    .await?;

    artifact::ensure_layout(&config.static_dir)?;

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!(address = %listener.local_addr()?, "Listening");

    let state = AppState::new(db.clone(), config);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
