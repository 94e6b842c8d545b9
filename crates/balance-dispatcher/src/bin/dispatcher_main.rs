//! RustBalance Dispatcher - Main Entry Point
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin balance-dispatcher -- \
//!     --machine m1=http://10.0.0.1:3000 \
//!     --machine m2=http://10.0.0.2:3000 \
//!     --machine m3=http://10.0.0.3:3000 \
//!     --redis-url redis://127.0.0.1:6379 \
//!     --max-queue-depth 250
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use balance_core::init_logging;
use balance_dispatcher::api::{router, AppState};
use balance_dispatcher::{Dispatcher, DispatcherConfig, HttpForwarder, RedisQueueStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DispatcherConfig::load().context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    let registry = config.registry()?;
    info!("🚀 RustBalance Dispatcher starting (PID: {})", std::process::id());
    config.log_summary(&registry);

    let store = RedisQueueStore::connect(&config.store.redis_url, &config.store.key_prefix)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.store.redis_url))?;
    info!("✓ Connected to Redis");

    let forwarder = HttpForwarder::new(config.forward_timeout())?;
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(store),
        Arc::new(forwarder),
        config.threshold(),
    );

    let app = router(AppState::new(dispatcher));

    let listener = tokio::net::TcpListener::bind(&config.network.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.network.listen_addr))?;
    info!("✓ Listening on http://{}", config.network.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("✅ Dispatcher shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, gracefully shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
