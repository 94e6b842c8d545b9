//! RustBalance Supervisor - Main Entry Point
//!
//! Starts one worker process per CPU core (or per core minus one) and keeps
//! the pool at that size until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # One balance-worker per core
//! cargo run --bin balance-supervisor
//!
//! # Leave a core free, back off on crash loops, run a custom worker
//! cargo run --bin balance-supervisor -- \
//!     --pool-size-policy all-cores-minus-one \
//!     --restart-policy backoff:100:10000 \
//!     -- ./credit-scores --port 3000
//! ```

use anyhow::{Context, Result};
use tracing::{error, info};

use balance_core::init_logging;
use balance_supervisor::{Supervisor, SupervisorArgs, SupervisorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = SupervisorArgs::load().context("Failed to load configuration")?;

    init_logging(&args.logging)?;

    let config = SupervisorConfig::from(&args);
    let pool_size = args.resolve_pool_size();
    let entry_point = args.entry_point()?;

    info!("🚀 RustBalance Supervisor starting (PID: {})", std::process::id());
    info!("  Pool size:      {} ({})", pool_size, args.pool_size_policy);
    info!("  Entry point:    {}", entry_point);
    info!("  Restart policy: {}", config.restart_policy);

    let handle = match Supervisor::new(config).start(pool_size, entry_point) {
        Ok(handle) => handle,
        Err(e) => {
            error!("✗ Failed to start workers: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Supervising workers (press Ctrl+C to stop)...");
    shutdown_signal().await;

    handle.shutdown().await?;
    info!("✅ Supervisor shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C signal"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
