//! Supervisor Configuration Module
//!
//! Configuration structures for the Process Supervisor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use balance_core::config::read_config_file;
use balance_core::{Error, LoggingConfig, PoolSizePolicy};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Name of the demo worker binary used when no entry point is given
pub const DEFAULT_WORKER_BINARY: &str = "balance-worker";

/// Supervisor configuration
///
/// Everything the supervisory loop needs besides the pool size and the
/// entry point, which are passed to `Supervisor::start` directly.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Restart policy for exited workers
    pub restart_policy: RestartPolicy,

    /// Delay before retrying a respawn whose process could not be created
    pub respawn_retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::Always,
            respawn_retry_delay: Duration::from_millis(500),
        }
    }
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set restart policy
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Set the retry delay for failed respawns
    pub fn with_respawn_retry_delay(mut self, delay: Duration) -> Self {
        self.respawn_retry_delay = delay;
        self
    }
}

/// Restart policy for exited workers
///
/// Neither variant has a restart ceiling: a slot is respawned for as long as
/// the supervisor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RestartPolicy {
    /// Respawn immediately
    Always,
    /// Respawn after a delay that doubles on each consecutive crash of a slot
    Backoff { initial_ms: u64, max_ms: u64 },
}

impl RestartPolicy {
    /// Delay before the `consecutive`-th restart in a row (1-based)
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        match self {
            Self::Always => Duration::ZERO,
            Self::Backoff { initial_ms, max_ms } => {
                let exponent = consecutive.saturating_sub(1);
                let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(*max_ms))
            }
        }
    }

    /// Uptime after which a worker counts as stable and its crash streak resets
    pub fn stable_after(&self) -> Duration {
        match self {
            Self::Always => Duration::ZERO,
            Self::Backoff { max_ms, .. } => Duration::from_millis(*max_ms),
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Backoff { initial_ms, max_ms } => write!(f, "backoff:{}:{}", initial_ms, max_ms),
        }
    }
}

impl std::str::FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts[0] {
            "always" if parts.len() == 1 => Ok(Self::Always),
            "backoff" if parts.len() <= 3 => {
                let initial_ms = match parts.get(1) {
                    Some(v) => v.parse().map_err(|_| "Invalid backoff initial_ms value".to_string())?,
                    None => 100,
                };
                let max_ms = match parts.get(2) {
                    Some(v) => v.parse().map_err(|_| "Invalid backoff max_ms value".to_string())?,
                    None => 10_000,
                };
                if initial_ms == 0 || max_ms < initial_ms {
                    return Err(format!("Backoff needs 0 < initial_ms <= max_ms: {}", s));
                }
                Ok(Self::Backoff { initial_ms, max_ms })
            }
            _ => Err(format!("Unknown restart policy: {}", s)),
        }
    }
}

impl TryFrom<String> for RestartPolicy {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RestartPolicy> for String {
    fn from(policy: RestartPolicy) -> Self {
        policy.to_string()
    }
}

/// The program each worker slot runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EntryPoint {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a command line: program followed by its arguments
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program, args.to_vec()))
    }

    /// A binary living in the same directory as the current executable
    pub fn sibling_binary(name: &str) -> Result<Self> {
        let current_exe = std::env::current_exe()
            .context("Failed to get current executable path")?;
        let exe_dir = current_exe
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Failed to get executable directory"))?;
        Ok(Self::new(exe_dir.join(name), Vec::new()))
    }

    /// Resolve the program to an existing file
    ///
    /// Paths are checked as given; bare names are looked up on `PATH`.
    pub fn resolve(&self) -> balance_core::Result<Self> {
        let program = if self.program.components().count() > 1 {
            if !self.program.is_file() {
                return Err(Error::EntryPointUnresolvable(format!(
                    "{} is not a file",
                    self.program.display()
                )));
            }
            self.program.clone()
        } else {
            which::which(&self.program).map_err(|e| {
                Error::EntryPointUnresolvable(format!("{}: {}", self.program.display(), e))
            })?
        };

        Ok(Self::new(program, self.args.clone()))
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Worker startup plan
///
/// Contains all information needed to start the process for one pool slot.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    /// Unique worker identifier
    pub worker_id: String,

    /// Slot index (0-indexed)
    pub slot: usize,

    /// Total pool size
    pub pool_size: usize,

    /// Program to run
    pub entry_point: EntryPoint,

    /// Extra environment variables to pass to the worker
    pub env_vars: HashMap<String, String>,
}

impl WorkerPlan {
    pub fn new(slot: usize, pool_size: usize, entry_point: EntryPoint) -> Self {
        Self {
            worker_id: format!("worker-{}", slot),
            slot,
            pool_size,
            entry_point,
            env_vars: HashMap::new(),
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.entry_point.program
    }

    pub fn build_command_args(&self) -> Vec<String> {
        self.entry_point.args.clone()
    }

    /// Build environment variables for the worker process
    pub fn build_env(&self) -> HashMap<String, String> {
        let mut env = self.env_vars.clone();

        env.insert("BALANCE_WORKER_ID".to_string(), self.worker_id.clone());
        env.insert("BALANCE_WORKER_SLOT".to_string(), self.slot.to_string());
        env.insert("BALANCE_POOL_SIZE".to_string(), self.pool_size.to_string());

        env
    }
}

/// Command-line arguments for balance-supervisor
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "balance-supervisor")]
#[command(version = "0.1.0")]
#[command(about = "RustBalance Supervisor - keep one worker process per CPU core alive")]
#[serde(default)]
pub struct SupervisorArgs {
    /// Pool size policy: all-cores, all-cores-minus-one
    #[arg(long, default_value = "all-cores")]
    pub pool_size_policy: PoolSizePolicy,

    /// Explicit pool size, overriding the policy
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Restart policy: always, backoff[:initial_ms[:max_ms]]
    #[arg(long, default_value = "always")]
    pub restart_policy: RestartPolicy,

    /// Delay before retrying a respawn that could not create a process (ms)
    #[arg(long, default_value_t = 500)]
    pub respawn_retry_ms: u64,

    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Optional: load these settings from a JSON or YAML file
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Worker entry point and its arguments (default: the balance-worker binary)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub entry_point: Vec<String>,
}

impl Default for SupervisorArgs {
    fn default() -> Self {
        Self {
            pool_size_policy: PoolSizePolicy::AllCores,
            pool_size: None,
            restart_policy: RestartPolicy::Always,
            respawn_retry_ms: 500,
            logging: LoggingConfig::default(),
            config_file: None,
            entry_point: Vec::new(),
        }
    }
}

impl SupervisorArgs {
    /// Parse the command line, switching to `--config-file` when given
    pub fn load() -> Result<Self> {
        let args = Self::parse();

        let args = match &args.config_file {
            Some(path) => read_config_file::<Self>(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            None => args,
        };

        args.validate()?;
        Ok(args)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == Some(0) {
            anyhow::bail!("pool_size must be greater than 0");
        }

        self.logging.validate()?;

        Ok(())
    }

    /// Pool size from the explicit override or the policy
    pub fn resolve_pool_size(&self) -> usize {
        self.pool_size
            .unwrap_or_else(|| self.pool_size_policy.pool_size())
    }

    /// Configured entry point, or the demo worker beside this executable
    pub fn entry_point(&self) -> Result<EntryPoint> {
        match EntryPoint::from_command(&self.entry_point) {
            Some(entry_point) => Ok(entry_point),
            None => EntryPoint::sibling_binary(DEFAULT_WORKER_BINARY),
        }
    }
}

impl From<&SupervisorArgs> for SupervisorConfig {
    fn from(args: &SupervisorArgs) -> Self {
        Self {
            restart_policy: args.restart_policy,
            respawn_retry_delay: Duration::from_millis(args.respawn_retry_ms),
        }
    }
}
