//! keyseed server entry point.
//!
//! Hardens the process, opens storage behind the barrier, and serves the
//! secret store API until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use keyseed_server::config::ServerConfig;
use keyseed_server::hardening;
use keyseed_server::routes;
use keyseed_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Before any secret touches memory.
    let report = hardening::apply(config.disable_mlock);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    log_hardening(&report);
    info!(storage = ?config.storage_backend, scope = %config.scope, "keyseed starting");

    let state = Arc::new(AppState::from_config(&config).await?);
    let app = routes::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "keyseed server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("keyseed server stopped");
    Ok(())
}

fn log_hardening(report: &hardening::HardeningReport) {
    if let Some(e) = &report.core_dumps {
        warn!(error = %e, "failed to disable core dumps");
    }
    if report.mlock_skipped {
        warn!("mlock disabled via KEYSEED_DISABLE_MLOCK, secrets may be swapped to disk");
    } else if let Some(e) = &report.memory_lock {
        warn!(error = %e, "failed to lock memory (set KEYSEED_DISABLE_MLOCK=true for dev)");
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
