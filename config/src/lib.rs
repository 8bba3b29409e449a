//! Switchboard configuration.
//!
//! Read from `<config dir>/switchboard/config.toml`. Every key is optional;
//! a missing file means all defaults.
//!
//! ```toml
//! [endpoint]
//! retry_interval_ms = 500
//! pending_high_water = 100000
//! cleanup_batch = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use switchboard_endpoint::EndpointConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl SwitchboardConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config: Self = match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    fn validate(&self) -> Result<(), String> {
        if self.endpoint.retry_interval_ms == 0 {
            return Err("endpoint.retry_interval_ms must be greater than zero".to_string());
        }
        if self.endpoint.pending_high_water == 0 {
            return Err("endpoint.pending_high_water must be greater than zero".to_string());
        }
        if self.endpoint.cleanup_batch == 0 {
            return Err("endpoint.cleanup_batch must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("switchboard").join("config.toml"))
}
