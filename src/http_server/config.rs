//! Control Server Configuration
//!
//! Bind address, shutdown grace period and the initial log level. Loadable
//! from a JSON file; every field has a default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ControlError, ControlResult};
use crate::observability::Level;

/// Port used when the bind address leaves it out
pub const DEFAULT_CONTROL_PORT: u16 = 8080;

/// Control server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period for in-flight requests on shutdown (default: 5000)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Level the process logs at on startup (default: info)
    #[serde(default)]
    pub log_level: Level,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            log_level: Level::default(),
        }
    }
}

impl ControlServerConfig {
    /// Config for a `host:port` address.
    ///
    /// An empty address selects the defaults; a missing host (`":9090"`)
    /// binds every interface.
    pub fn from_addr(addr: &str) -> ControlResult<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Ok(Self::default());
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ControlError::InvalidAddress(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ControlError::InvalidAddress(addr.to_string()))?;
        let host = if host.is_empty() {
            default_host()
        } else {
            host.to_string()
        };

        Ok(Self {
            host,
            port,
            ..Default::default()
        })
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> ControlResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ControlError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
