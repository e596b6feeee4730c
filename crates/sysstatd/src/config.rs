//! Daemon configuration.
//!
//! Read from a TOML file (`--config` or `<config_dir>/sysstat/sysstatd.toml`).
//! Every field has a default, so an empty or missing file is valid.
//!
//! ```toml
//! socket_path = "/tmp/sysstat.sock"
//! poll_interval_ms = 500
//! quit_on_last_client = false
//!
//! [providers]
//! cpu = true
//! memory = true
//! disk = true
//! network = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::DEFAULT_SOCKET_PATH;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "SYSSTAT_SOCKET";

/// Top-level daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub poll_interval_ms: u64,
    pub quit_on_last_client: bool,
    pub providers: ProviderToggles,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            poll_interval_ms: 500,
            quit_on_last_client: false,
            providers: ProviderToggles::default(),
        }
    }
}

/// Which built-in providers to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToggles {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
    pub network: bool,
}

impl Default for ProviderToggles {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
        }
    }
}

impl DaemonConfig {
    /// `<config_dir>/sysstat/sysstatd.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sysstat").join("sysstatd.toml"))
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given (it must exist), otherwise the default
    /// path if a file is there, otherwise the built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Applies `SYSSTAT_SOCKET` if set.
    pub fn apply_env(&mut self) {
        self.apply_socket_override(std::env::var_os(SOCKET_ENV).map(PathBuf::from));
    }

    fn apply_socket_override(&mut self, socket: Option<PathBuf>) {
        if let Some(path) = socket.filter(|p| !p.as_os_str().is_empty()) {
            self.socket_path = path;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
