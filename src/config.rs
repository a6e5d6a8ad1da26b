//! Configuration management

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StreamFormat;
use crate::transport::DEFAULT_TIMEOUT_SECS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no config directory on this platform")]
    NoConfigDir,
}

/// Xtream Codes provider account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub enable_user_agent_spoofing: bool,
    #[serde(default)]
    pub custom_user_agent: String,
    #[serde(default)]
    pub stream_format: StreamFormat,
}

/// DVR REST API account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DvrSettings {
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Guide parsing preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpgSettings {
    /// Apply the `+HHMM` offset carried by XMLTV timestamps
    #[serde(default = "default_true")]
    pub apply_timezone_offset: bool,
    /// Manual correction for providers with a skewed guide clock
    #[serde(default)]
    pub time_offset_hours: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub dvr: DvrSettings,
    #[serde(default)]
    pub epg: EpgSettings,
}

fn default_port() -> u16 { 80 }
fn default_timeout() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_true() -> bool { true }

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 80,
            username: String::new(),
            password: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            enable_user_agent_spoofing: false,
            custom_user_agent: String::new(),
            stream_format: StreamFormat::Ts,
        }
    }
}

impl ProviderSettings {
    /// First problem that would prevent talking to the provider.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.server.trim().is_empty() {
            return Err("Server is empty");
        }
        if self.port == 0 {
            return Err("Port is invalid");
        }
        if self.username.trim().is_empty() {
            return Err("Username is empty");
        }
        if self.password.trim().is_empty() {
            return Err("Password is empty");
        }
        Ok(())
    }
}

impl Default for DvrSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 80,
            username: String::new(),
            password: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for EpgSettings {
    fn default() -> Self {
        Self {
            apply_timezone_offset: true,
            time_offset_hours: 0.0,
        }
    }
}

impl AppConfig {
    /// `<config dir>/xtream_pvr/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("xtream_pvr");
        path.push("config.json");
        Ok(path)
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        let path = match Self::default_path() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Using default configuration");
                return Self::default();
            }
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path()?)
    }

    /// Writes a default config at `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn init_at(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(io_err)
    }
}
