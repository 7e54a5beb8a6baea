// =============================================================================
// Aurora Gateway — Main Entry Point
// =============================================================================
//
// Boots shared state, the rate-limiter cleanup worker, the position-update
// relay, and the HTTP/WS server. The exchange user-data stream is started
// and stopped per trading session by the `/trade/start` and `/trade/stop`
// handlers, not here.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aurora_gateway::api;
use aurora_gateway::app_state::AppState;
use aurora_gateway::rate_limit::spawn_cleanup_worker;
use aurora_gateway::runtime_config::RuntimeConfig;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CONFIG_PATH: &str = "config.json";
/// Upper bound on draining in-flight requests once a shutdown signal
/// arrives, after which the server future is abandoned outright.
const REQUEST_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("aurora-gateway starting up");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = RuntimeConfig::load_or_default(&config_path).apply_env_overrides();
    let bind_addr = format!("{}:{}", config.api_host, config.api_port);

    info!(
        api_host = %config.api_host,
        api_port = config.api_port,
        production = config.production,
        "runtime config resolved"
    );

    let state = Arc::new(AppState::new(config));

    state.spawn_position_broadcast_relay();

    let cleanup_handle = spawn_cleanup_worker(state.rate_limiter.clone(), RATE_LIMIT_CLEANUP_INTERVAL);

    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "gateway listening");

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    match tokio::time::timeout(REQUEST_DRAIN_TIMEOUT, serve).await {
        Ok(result) => result?,
        Err(_) => warn!("in-flight requests did not drain within {REQUEST_DRAIN_TIMEOUT:?}, abandoning them"),
    }

    warn!("shutdown signal received — draining background work");

    state.stop_user_data_stream().await;
    cleanup_handle.shutdown().await;

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("aurora-gateway shut down complete");
    Ok(())
}

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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
