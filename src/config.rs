//! Runtime configuration
//!
//! Settings come from, in increasing precedence: built-in defaults, an
//! optional `anisync.toml` file, a `.env` file, and environment variables.
//! The binary applies its command-line flags on top.
//!
//! ## Environment Variables
//!
//! - `ANISYNC_API_URL` - Base URL of the Jikan-compatible API
//! - `ANISYNC_DB_PATH` - Path of the SQLite cache file
//! - `ANISYNC_TIMEOUT_SECS` - Remote request timeout
//! - `ANISYNC_EVENT_CAPACITY` - Buffer size of the outcome event channel

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "anisync.toml";
pub const DEFAULT_API_URL: &str = "https://api.jikan.moe/v4";

pub const ENV_API_URL: &str = "ANISYNC_API_URL";
pub const ENV_DB_PATH: &str = "ANISYNC_DB_PATH";
pub const ENV_TIMEOUT_SECS: &str = "ANISYNC_TIMEOUT_SECS";
pub const ENV_EVENT_CAPACITY: &str = "ANISYNC_EVENT_CAPACITY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote catalog
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// SQLite cache location (defaults to the user data directory)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Timeout applied to every remote request
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Capacity of each engine's outcome event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Interval between reachability probes in `watch` mode
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    4
}

fn default_probe_interval_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            db_path: None,
            request_timeout_secs: default_timeout_secs(),
            event_capacity: default_event_capacity(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `./anisync.toml` when present),
    /// then apply `.env` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let default_path = PathBuf::from(CONFIG_FILE_NAME);
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if default_path.exists() => Self::from_file(&default_path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.is_empty() {
                self.api_url = url;
            }
        }

        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            if !path.is_empty() {
                self.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(secs) = std::env::var(ENV_TIMEOUT_SECS) {
            if let Ok(secs) = secs.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }

        if let Ok(capacity) = std::env::var(ENV_EVENT_CAPACITY) {
            if let Ok(capacity) = capacity.parse::<usize>() {
                self.event_capacity = capacity;
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// Cache file path, falling back to `<data dir>/anisync/anime.db`.
    pub fn resolve_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }

        dirs::data_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("anisync")
            .join("anime.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.event_capacity, 4);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            api_url = "http://localhost:8080/v4"
            event_capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.api_url, "http://localhost:8080/v4");
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("event_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_explicit_db_path_wins() {
        let config = Config {
            db_path: Some(PathBuf::from("/tmp/anime-test.db")),
            ..Config::default()
        };
        assert_eq!(config.resolve_db_path(), PathBuf::from("/tmp/anime-test.db"));
    }

    #[test]
    fn test_default_db_path_file_name() {
        let config = Config::default();
        assert!(config.resolve_db_path().ends_with("anisync/anime.db"));
    }
}
