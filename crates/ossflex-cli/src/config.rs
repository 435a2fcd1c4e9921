//! Driver configuration file.
//!
//! Read from `$OSSFLEX_CONFIG`, or `/etc/ossflex/config.toml` by default. A
//! missing file means every default applies.
//!
//! # Example configuration
//!
//! ```toml
//! [paths]
//! shared_mount_root = "/oss"
//! credential_file = "/etc/passwd-ossfs"
//! kubelet_root = "/var/lib/kubelet"
//!
//! [tools]
//! ossfs = "/usr/local/bin/ossfs"
//!
//! [logging]
//! dir = "/var/log/ossflex"
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use ossflex_mount::{DriverPaths, FuseTools};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ossflex/config.toml";

/// Main configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Node-local paths
    pub paths: DriverPaths,

    /// External program names
    pub tools: FuseTools,

    /// Log output
    pub logging: LoggingConfig,
}

/// Log output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling log file
    pub dir: PathBuf,

    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/log/ossflex"),
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or return defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
