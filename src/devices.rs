// src/devices.rs
// Named device inventory (devices.toml) and how each entry is reached.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::connector::{ConnectParams, Connector, Credential, SshCommandConnector, TcpConnector};
use crate::errors::{NetconfError, Result};
use crate::session::SessionOptions;

pub const DEFAULT_DEVICES_FILENAME: &str = "devices.toml";
pub const NETCONF_SSH_PORT: u16 = 830;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct DeviceRegistry {
    #[serde(default)]
    pub devices: HashMap<String, DeviceEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    Tcp,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    pub address: String,
    pub username: String,
    #[serde(default = "default_netconf_port")]
    pub port: u16,
    pub identity_file: Option<String>,
    #[serde(default = "default_true")]
    pub host_key_check: bool,
    #[serde(default)]
    pub transport: TransportKind,
    pub connect_timeout: Option<u64>, // Seconds
    pub reply_timeout: Option<u64>,   // Seconds
}

fn default_netconf_port() -> u16 {
    NETCONF_SSH_PORT
}

fn default_true() -> bool {
    true
}

impl DeviceRegistry {
    /// A missing file is an empty registry.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            debug!("No {} found; device registry is empty", DEFAULT_DEVICES_FILENAME);
            return Ok(DeviceRegistry::default());
        };
        let content = fs::read_to_string(path)
            .map_err(|e| NetconfError::Config(format!("Failed to read device file at {:?}: {}", path, e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| NetconfError::Config(format!("Failed to parse device file at {:?}: {}", path, e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let registry: DeviceRegistry = toml::from_str(content).map_err(|e| NetconfError::Config(e.to_string()))?;
        for (name, entry) in &registry.devices {
            if entry.connect_timeout == Some(0) || entry.reply_timeout == Some(0) {
                return Err(NetconfError::Config(format!(
                    "device '{}': timeouts must be greater than zero",
                    name
                )));
            }
            if entry.address.is_empty() || entry.address.starts_with('-') {
                return Err(NetconfError::Config(format!(
                    "device '{}': invalid address '{}'",
                    name, entry.address
                )));
            }
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<&DeviceEntry> {
        self.devices
            .get(name)
            .ok_or_else(|| NetconfError::Config(format!("No device named '{}' in {}", name, DEFAULT_DEVICES_FILENAME)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.devices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl DeviceEntry {
    /// Identity file with `~` and environment variables expanded.
    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity_file.as_deref().map(|raw| {
            let expanded = shellexpand::full(raw).unwrap_or_else(|_| shellexpand::tilde(raw));
            PathBuf::from(expanded.into_owned())
        })
    }

    pub fn connect_params(&self) -> ConnectParams {
        let credential = self
            .identity_path()
            .map(Credential::IdentityFile)
            .unwrap_or_default();
        ConnectParams::new(&self.address, &self.username, credential, self.port)
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        match self.transport {
            TransportKind::Ssh => Box::new(SshCommandConnector {
                host_key_check: self.host_key_check,
                ..Default::default()
            }),
            TransportKind::Tcp => Box::new(TcpConnector),
        }
    }

    /// `base` with this device's timeout overrides applied.
    pub fn session_options(&self, base: &SessionOptions) -> SessionOptions {
        let mut options = base.clone();
        if let Some(secs) = self.connect_timeout {
            options.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.reply_timeout {
            options.reply_timeout = Duration::from_secs(secs);
        }
        options
    }
}
