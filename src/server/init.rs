//! Session service initialization and run loop

use super::config::AppConfig;
use super::loader::load_config;
use crate::api::{api_router, SessionService};
use anyhow::{Context, Result};
use axum::Router;
use labelsync_core::{FileKvStore, LocalAdapter, StorageOrigin};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Service routes under `/api`, with request tracing
pub fn build_app(service: SessionService) -> Router {
    Router::new()
        .nest("/api", api_router(service))
        .layer(TraceLayer::new_for_http())
}

/// Session service over the file store in the data directory
pub fn build_service(config: &AppConfig) -> Result<SessionService> {
    let dir = config.service_dir();
    let store = FileKvStore::open(&dir)
        .with_context(|| format!("Failed to open service store at {}", dir.display()))?;
    info!("Service store: {}", dir.display());

    Ok(SessionService::new(Arc::new(
        LocalAdapter::new(Arc::new(store))
            .with_prefix(config.device.key_prefix.clone())
            .with_origin(StorageOrigin::Remote)
            .with_name("service"),
    )))
}

/// Run the session service until Ctrl+C or SIGTERM
pub async fn run(ephemeral: bool) -> Result<()> {
    info!("Starting labelsync session service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    let service = if ephemeral {
        info!("Ephemeral mode: sessions are kept in memory only");
        SessionService::in_memory()
    } else {
        build_service(&config)?
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}/api", addr);

    axum::serve(listener, build_app(service))
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("labelsync shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
