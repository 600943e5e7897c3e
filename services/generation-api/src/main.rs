//! Generation API
//!
//! Single-binary HTTP service that:
//! 1. Serves text and image generation requests
//! 2. Takes a provider credential from a rotating pool for every call
//! 3. Quarantines credentials the provider refuses, for a day, in a JSON file
//!    shared by both pools
//! 4. Resets a pool when every credential is quarantined

mod config;
mod error;
mod metrics;
mod routes;
mod templates;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use key_pool::{AuditLog, CredentialSource, EnvSource, JsonFileStore, KeyPool, QuarantineStore};
use provider::{
    ImageEngine, OpenRouterEngine, PlaceholderImageEngine, PlaceholderTextEngine, TextEngine,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, TextEngineKind};
use crate::routes::{AppState, build_router};

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by LOG_LEVEL, then RUST_LOG, then "info"
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting generation-api");

    // Before any pool is built: pools emit metrics from their first acquire
    let prometheus = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        quarantine_file = %config.store.quarantine_file.display(),
        ttl_hours = config.store.ttl_hours,
        text_key_type = %config.text.key_type,
        image_key_type = %config.image.key_type,
        text_engine = ?config.text.engine,
        "configuration loaded"
    );

    let state = build_state(&config, prometheus);
    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start: the
    // server is told to drain, then raced against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wire pools and engines from configuration.
///
/// Both pools share one quarantine file and one audit log; credentials are
/// read from the process environment.
fn build_state(
    config: &Config,
    prometheus: metrics_exporter_prometheus::PrometheusHandle,
) -> AppState {
    let store: Arc<dyn QuarantineStore> =
        Arc::new(JsonFileStore::new(config.store.quarantine_file.clone()));
    let source: Arc<dyn CredentialSource> = Arc::new(EnvSource);
    let audit = AuditLog::new(config.store.audit_log.clone());

    let text_pool = KeyPool::new(config.text.pool_config(), source.clone(), store.clone())
        .with_ttl(config.store.ttl())
        .with_audit_log(audit.clone());
    let image_pool = KeyPool::new(config.image.pool_config(), source, store)
        .with_ttl(config.store.ttl())
        .with_audit_log(audit);

    let text_engine: Arc<dyn TextEngine> = match config.text.engine {
        TextEngineKind::Placeholder => Arc::new(PlaceholderTextEngine::new()),
        TextEngineKind::OpenRouter => Arc::new(OpenRouterEngine::new(
            reqwest::Client::new(),
            config.text.base_url.clone(),
            config.text.timeout(),
        )),
    };
    let image_engine: Arc<dyn ImageEngine> = Arc::new(PlaceholderImageEngine::new(
        config.image.placeholder_base_url.clone(),
    ));

    AppState {
        text_pool: Arc::new(text_pool),
        image_pool: Arc::new(image_pool),
        text_engine,
        image_engine,
        default_model: Arc::from(config.text.default_model.as_str()),
        prometheus,
        started_at: Instant::now(),
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
