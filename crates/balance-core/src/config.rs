//! Config file loading
//!
//! Both services accept `--config-file` pointing at a JSON or YAML document
//! with the same shape as their command-line sections.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Load a config document, picking the format from the file extension
pub fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Err(Error::InvalidArgument(format!(
            "Unsupported config file format (use .yaml, .yml, or .json): {}",
            path.display()
        ))),
    }
}
