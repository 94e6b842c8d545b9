//! Machine Registry
//!
//! The static, ordered list of remote machines the dispatcher may route to.
//! Order defines the round-robin rotation.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single remote machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    /// Identifier, also the key the machine publishes its queue depth under
    pub id: String,

    /// Reachable endpoint (e.g. "http://10.0.0.5:3000")
    pub endpoint: String,
}

impl MachineEntry {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for MachineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, self.endpoint)
    }
}

/// Parses the `id=endpoint` form used on the command line
impl FromStr for MachineEntry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, endpoint) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid machine entry: {}", s)))?;

        let id = id.trim();
        let endpoint = endpoint.trim();
        if id.is_empty() || endpoint.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Machine entry needs both an id and an endpoint: {}",
                s
            )));
        }

        Ok(Self::new(id, endpoint))
    }
}

/// Ordered, validated set of machines
///
/// Identifiers are unique and the registry is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineRegistry {
    entries: Vec<MachineEntry>,
}

impl MachineRegistry {
    pub fn new(entries: Vec<MachineEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyRegistry);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::DuplicateMachine(entry.id.clone()));
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed registry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MachineEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MachineEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Parse a registry list
///
/// Format: "a=http://host-a:3000;b=http://host-b:3000"
pub fn parse_registry(s: &str) -> Result<MachineRegistry> {
    let entries = s
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<MachineEntry>>>()?;

    MachineRegistry::new(entries)
}
