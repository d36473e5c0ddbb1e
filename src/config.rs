// src/config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use xdg::BaseDirectories;

use crate::devices::DEFAULT_DEVICES_FILENAME;
use crate::errors::{NetconfError, Result};
use crate::session::{FramingMode, SessionOptions};

pub const APP_NAME: &str = "ncexec";
pub const DEFAULT_CONFIG_FILENAME: &str = "config.toml";

// Main configuration structure, mapping to config.toml
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    // Resolved during Config::load, not part of config.toml itself
    #[serde(skip)]
    pub devices_file_path: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub framing: FramingMode,
}

fn default_reply_timeout_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            reply_timeout_ms: default_reply_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            framing: FramingMode::default(),
        }
    }
}

impl SessionConfig {
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            framing: self.framing,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace" | "debug" | "info" | "warn" | "error"
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config.toml from `config_path_override` or the XDG config
    /// directory. Without an override a missing file means defaults; an
    /// explicit path must exist.
    pub fn load(config_path_override: Option<&Path>) -> Result<Self> {
        let xdg_dirs = BaseDirectories::with_prefix(APP_NAME)
            .map_err(|e| NetconfError::Config(format!("Cannot resolve XDG directories: {}", e)))?;

        let config_path = match config_path_override {
            Some(path) => {
                debug!("Using provided config path override: {}", path.display());
                if !path.exists() {
                    return Err(NetconfError::Config(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => xdg_dirs.find_config_file(DEFAULT_CONFIG_FILENAME),
        };

        let mut config = match &config_path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|e| {
                    NetconfError::Config(format!("Failed to read config file at {}: {}", path.display(), e))
                })?;
                Config::from_toml_str(&content)?
            }
            None => {
                debug!("No {} found; using defaults", DEFAULT_CONFIG_FILENAME);
                Config::default()
            }
        };

        // devices.toml lives next to config.toml unless XDG has one
        config.devices_file_path = xdg_dirs.find_config_file(DEFAULT_DEVICES_FILENAME).or_else(|| {
            let dir = config_path
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| xdg_dirs.get_config_home());
            Some(dir.join(DEFAULT_DEVICES_FILENAME))
        });

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| NetconfError::Config(format!("Failed to parse TOML configuration: {}", e)))?;
        if config.session.reply_timeout_ms == 0 || config.session.connect_timeout_ms == 0 {
            return Err(NetconfError::Config("session timeouts must be greater than zero".into()));
        }
        Ok(config)
    }
}
