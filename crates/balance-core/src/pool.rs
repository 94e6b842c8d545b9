//! Pool Size Policy
//!
//! Derives the number of local worker processes from the CPU core count.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolSizePolicy {
    /// One worker per core
    AllCores,
    /// One worker per core, leaving a core for the supervisor itself
    AllCoresMinusOne,
}

impl PoolSizePolicy {
    /// Pool size for a machine with `cores` cores; never below one
    pub fn resolve(&self, cores: usize) -> usize {
        let size = match self {
            Self::AllCores => cores,
            Self::AllCoresMinusOne => cores.saturating_sub(1),
        };
        size.max(1)
    }

    /// Pool size for this machine
    pub fn pool_size(&self) -> usize {
        self.resolve(num_cpus::get())
    }
}

impl Default for PoolSizePolicy {
    fn default() -> Self {
        Self::AllCores
    }
}

impl fmt::Display for PoolSizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllCores => write!(f, "all-cores"),
            Self::AllCoresMinusOne => write!(f, "all-cores-minus-one"),
        }
    }
}

impl FromStr for PoolSizePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-cores" => Ok(Self::AllCores),
            "all-cores-minus-one" => Ok(Self::AllCoresMinusOne),
            _ => Err(Error::InvalidArgument(format!("Unknown pool size policy: {}", s))),
        }
    }
}
