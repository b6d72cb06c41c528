mod config;
mod http;
mod metrics;
mod middleware;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use limitcrab::{RateLimiter, RedisScriptStore, StrategyManager};

use crate::config::Config;
use crate::http::AppState;
use crate::metrics::ServerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("limitcrab={}", config.log_level).parse()?)
                .add_directive(format!("limitcrab_server={}", config.log_level).parse()?),
        )
        .init();

    // Connect to the store and verify it is reachable before serving
    let store = RedisScriptStore::connect(&config.redis_url)
        .await
        .with_context(|| format!("failed to connect to redis at {}", config.redis_url))?;
    tokio::time::timeout(Duration::from_secs(5), store.ping())
        .await
        .with_context(|| format!("timed out pinging redis at {}", config.redis_url))??;
    tracing::info!("connected to redis at {}", config.redis_url);

    // Build the configured engine, instrumented with the server's metrics
    let server_metrics = Arc::new(ServerMetrics::new());
    let manager = StrategyManager::with_collector(
        config.limiter.clone(),
        Arc::new(store),
        server_metrics.clone(),
    );
    let limiter: Arc<dyn RateLimiter> = Arc::from(manager.current()?);
    tracing::info!(
        strategy = %config.limiter.strategy,
        available = ?manager.available(),
        "rate limiter ready"
    );

    let state = Arc::new(AppState {
        limiter,
        metrics: server_metrics,
    });
    let app = http::router(state);

    let addr = format!("{}:{}", config.listen.host, config.listen.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("HTTP server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutting down");
}
