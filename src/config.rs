//! Runtime configuration
//!
//! Defaults, overridden by an optional JSON file in the platform config
//! directory, overridden in turn by environment variables and CLI flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound on the reference document size
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Persisted metrics collection
    pub data_path: PathBuf,
    /// Markdown reference document the metrics are extracted from
    pub document_path: PathBuf,
    pub max_document_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data").join("metrics.json"),
            document_path: PathBuf::from("METRICS_REFERENCE.md"),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_path: Option<PathBuf>,
    pub document_path: Option<PathBuf>,
}

/// Get the path to the optional configuration file
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("insights-metrics").join("config.json"))
}

/// Load a configuration file, falling back to defaults when it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(config)
}

impl Config {
    /// Resolve the effective configuration for this process
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let config = match config_path() {
            Some(path) => load_config(&path)?,
            None => Config::default(),
        };
        Ok(config.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(path) = &overrides.data_path {
            self.data_path = path.clone();
        }
        if let Some(path) = &overrides.document_path {
            self.document_path = path.clone();
        }
        self
    }
}
