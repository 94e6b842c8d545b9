//! Dispatcher Configuration
//!
//! ```text
//! DispatcherConfig
//!   ├─ NetworkConfig    (listen address, forward timeout)
//!   ├─ BalancingConfig  (machine registry, MAX)
//!   ├─ StoreConfig      (Redis connection, key prefix)
//!   └─ LoggingConfig
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use balance_core::config::read_config_file;
use balance_core::load::DEFAULT_MAX_QUEUE_DEPTH;
use balance_core::{parse_registry, LoadThreshold, LoggingConfig, MachineEntry, MachineRegistry};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "balance-dispatcher")]
#[command(about = "RustBalance Dispatcher - queue-aware round-robin request routing", long_about = None)]
#[serde(default)]
pub struct DispatcherConfig {
    #[command(flatten)]
    pub network: NetworkConfig,

    #[command(flatten)]
    pub balancing: BalancingConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Optional: load these settings from a JSON or YAML file
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the HTTP front listens on
    #[arg(long, default_value = "0.0.0.0:8080", env = "BALANCE_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Timeout for one forwarded request (milliseconds)
    #[arg(long, default_value_t = 5000)]
    pub forward_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            forward_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct BalancingConfig {
    /// Machine as `id=endpoint`; repeat in rotation order
    #[arg(long = "machine", value_name = "ID=ENDPOINT")]
    pub machines: Vec<MachineEntry>,

    /// Semicolon-separated machines, appended after `--machine` entries
    ///
    /// Example: "m1=http://10.0.0.1:3000;m2=http://10.0.0.2:3000"
    #[arg(long = "machines", value_name = "LIST", env = "BALANCE_MACHINES")]
    pub machine_list: Option<String>,

    /// Machines with a queue depth at or above this value are skipped
    #[arg(long, default_value_t = DEFAULT_MAX_QUEUE_DEPTH)]
    pub max_queue_depth: u64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            machines: Vec::new(),
            machine_list: None,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis holding one queue-depth key per machine
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "REDIS_URL")]
    pub redis_url: String,

    /// Prefix prepended to the machine id to form the key
    #[arg(long, default_value = "")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
        }
    }
}

impl DispatcherConfig {
    /// Parse the command line, switching to `--config-file` when given
    pub fn load() -> Result<Self> {
        let config = Self::parse();

        let config = match &config.config_file {
            Some(path) => read_config_file::<Self>(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            None => config,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.forward_timeout_ms == 0 {
            anyhow::bail!("forward_timeout_ms must be greater than 0");
        }

        if self.balancing.max_queue_depth == 0 {
            anyhow::bail!("max_queue_depth must be greater than 0");
        }

        self.registry()?;
        self.logging.validate()?;

        Ok(())
    }

    /// Ordered registry: `--machine` entries first, then `--machines`
    pub fn registry(&self) -> Result<MachineRegistry> {
        let mut entries = self.balancing.machines.clone();

        if let Some(list) = &self.balancing.machine_list {
            entries.extend(parse_registry(list)?.iter().cloned());
        }

        MachineRegistry::new(entries).context("Invalid machine registry")
    }

    pub fn threshold(&self) -> LoadThreshold {
        LoadThreshold::new(self.balancing.max_queue_depth)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.network.forward_timeout_ms)
    }

    pub fn log_summary(&self, registry: &MachineRegistry) {
        info!("📋 Dispatcher Configuration:");
        info!("  Listen address:  {}", self.network.listen_addr);
        info!("  Forward timeout: {}ms", self.network.forward_timeout_ms);
        info!("  MAX queue depth: {}", self.balancing.max_queue_depth);
        info!("  Redis:           {}", self.store.redis_url);
        if !self.store.key_prefix.is_empty() {
            info!("  Key prefix:      {}", self.store.key_prefix);
        }
        info!("  Machines ({}):", registry.len());
        for machine in registry.iter() {
            info!("    {}", machine);
        }
    }
}
