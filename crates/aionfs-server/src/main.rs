//! `aionfsd` entry point.
//!
//! Loads the metadata catalog from the configured backend, optionally loads a
//! bearer-token map, then serves the HTTP API until SIGINT/SIGTERM. The
//! catalog is flushed once more after the server stops.

use std::sync::Arc;

use anyhow::Context;
use axum::ServiceExt;
use axum::extract::Request;
use tokio::net::TcpListener;
use tracing::info;

use aionfs_core::auth::{AuthPolicy, PrincipalResolver, StaticTokenResolver};
use aionfs_core::catalog::Catalog;
use aionfs_core::lifecycle::Lifecycle;
use aionfs_storage::{FileBackend, MemoryBackend, StorageBackend};

use aionfs_server::config::{ServerConfig, StorageKind};
use aionfs_server::routes;
use aionfs_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        storage = ?config.storage,
        reattach = ?config.reattach,
        "aionfsd starting"
    );

    let state = build_app_state(&config).await?;
    let lifecycle = Arc::clone(&state.lifecycle);
    let app = routes::app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "aionfsd listening");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    lifecycle
        .flush()
        .await
        .context("failed to flush state on shutdown")?;

    info!("aionfsd stopped");
    Ok(())
}

/// Open the backend and catalog, and load the token map if configured.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let backend: Arc<dyn StorageBackend> = match &config.storage {
        StorageKind::Memory => {
            info!("using in-memory storage (state will not persist)");
            Arc::new(MemoryBackend::new())
        }
        StorageKind::File { dir } => {
            info!(dir = %dir.display(), "using file storage");
            Arc::new(
                FileBackend::open(dir)
                    .with_context(|| format!("failed to open data dir {}", dir.display()))?,
            )
        }
    };

    let catalog = Arc::new(
        Catalog::open(backend)
            .await
            .context("failed to load persisted state")?,
    );

    let resolver: Option<Arc<dyn PrincipalResolver>> = match &config.token_file {
        Some(path) => {
            let resolver = StaticTokenResolver::from_file(path)
                .context("failed to load token file")?;
            info!(entries = resolver.len(), "token resolver loaded");
            let resolver: Arc<dyn PrincipalResolver> = Arc::new(resolver);
            Some(resolver)
        }
        None => {
            info!("no token file configured, authorization disabled");
            None
        }
    };

    let auth = if resolver.is_some() {
        AuthPolicy::Enabled
    } else {
        AuthPolicy::Disabled
    };

    let lifecycle = Arc::new(Lifecycle::new(catalog, auth, config.reattach));

    Ok(Arc::new(AppState {
        lifecycle,
        resolver,
    }))
}

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
