//! RustBalance Demo Worker
//!
//! Stand-in for the real backend a pool slot runs. It initializes, then
//! heartbeats until Ctrl+C. Failure flags let the supervisor's respawn
//! behavior be exercised by hand.
//!
//! # Usage
//!
//! ```bash
//! # Under the supervisor, crashing every 10 seconds
//! cargo run --bin balance-supervisor -- -- target/debug/balance-worker --fail-after 10
//! ```

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use balance_core::{init_logging, LoggingConfig};

/// RustBalance Worker Process
#[derive(Parser, Debug)]
#[command(name = "balance-worker")]
#[command(version = "0.1.0")]
#[command(about = "RustBalance Worker - demo worker process for the supervisor")]
struct Args {
    /// Make backend initialization fail
    #[arg(long, default_value_t = false)]
    fail_init: bool,

    /// Exit with an error after N seconds
    #[arg(long)]
    fail_after: Option<u64>,

    /// Seconds between heartbeat log lines
    #[arg(long, default_value_t = 5)]
    heartbeat_secs: u64,

    #[command(flatten)]
    logging: LoggingConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.logging)?;

    let worker_id = std::env::var("BALANCE_WORKER_ID").unwrap_or_else(|_| "worker".to_string());
    info!("[{}] Worker started. PID: {}", worker_id, std::process::id());

    if let Err(e) = initialize_backend(&args).await {
        error!("[{}] Failed to initialize backend: {:#}", worker_id, e);
        return Err(e);
    }
    info!("[{}] Ready", worker_id);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let heartbeat = Duration::from_secs(args.heartbeat_secs.max(1));
    let mut elapsed = Duration::ZERO;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("[{}] Received shutdown signal", worker_id);
                break;
            }
            _ = tokio::time::sleep(heartbeat) => {
                elapsed += heartbeat;

                if let Some(fail_secs) = args.fail_after {
                    if elapsed.as_secs() >= fail_secs {
                        error!("[{}] Simulated failure after {} seconds", worker_id, fail_secs);
                        anyhow::bail!("Simulated worker failure");
                    }
                }

                info!("[{}] Heartbeat: {}s elapsed", worker_id, elapsed.as_secs());
            }
        }
    }

    info!("[{}] Shutdown complete", worker_id);
    Ok(())
}

async fn initialize_backend(args: &Args) -> Result<()> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if args.fail_init {
        anyhow::bail!("Simulated initialization failure");
    }
    Ok(())
}
