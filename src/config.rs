//! Configuration handling for vpn-bypass

use crate::feed::DEFAULT_FEED_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub routes: RoutesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Shared between add and delete flows; must stay constant across
    /// invocations or stale routes become undeletable by metric-aware
    /// tables.
    pub metric: u32,
    /// Holds bulk_routes.txt, custom_routes.txt and the lock file.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig {
                url: DEFAULT_FEED_URL.to_string(),
            },
            routes: RoutesConfig {
                metric: 25,
                data_dir: default_data_dir(),
            },
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vpn-bypass")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from an explicit path, else the first of
    /// `./vpn-bypass.toml` and `~/.vpn-bypass/config.toml` that exists,
    /// else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = PathBuf::from("vpn-bypass.toml");
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".vpn-bypass").join("config.toml");
            if home_config.exists() {
                return Self::load(&home_config);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }
}
