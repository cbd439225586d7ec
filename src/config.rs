//! Vault configuration
//!
//! Loaded from a JSON file:
//!
//! ```text
//! {
//!   "snapshot_path": "./vault.json",   (required)
//!   "log_level": "info",               (default "info")
//!   "max_walk_factor": 1,              (default 1)
//!   "verify_on_open": true             (default true)
//! }
//! ```
//!
//! Unknown keys are rejected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Logger, Severity};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Snapshot file backing the state store
    pub snapshot_path: String,

    /// Lowest log severity emitted
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Linear chain walks stop after `max_walk_factor * versions + 1` steps
    #[serde(default = "default_max_walk_factor")]
    pub max_walk_factor: usize,

    /// Verify a history's graph whenever the CLI opens it
    #[serde(default = "default_verify_on_open")]
    pub verify_on_open: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_walk_factor() -> usize {
    1
}
fn default_verify_on_open() -> bool {
    true
}

impl VaultConfig {
    /// Configuration with defaults for everything but the snapshot path.
    pub fn new(snapshot_path: impl Into<String>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            log_level: default_log_level(),
            max_walk_factor: default_max_walk_factor(),
            verify_on_open: default_verify_on_open(),
        }
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: VaultConfig = serde_json::from_str(&content)?;
        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("log_level", &config.log_level),
                ("snapshot_path", &config.snapshot_path),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.snapshot_path.trim().is_empty() {
            return Err(ConfigError::Invalid("snapshot_path must not be empty".into()));
        }
        if self.max_walk_factor == 0 {
            return Err(ConfigError::Invalid("max_walk_factor must be > 0".into()));
        }
        self.severity()?;
        Ok(())
    }

    pub fn snapshot_path(&self) -> &Path {
        Path::new(&self.snapshot_path)
    }

    /// Parsed `log_level`.
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// Installs `log_level` as the process-wide minimum severity.
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }
}
