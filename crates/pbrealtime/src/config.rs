//! Configuration management for pbrealtime.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::store::DEFAULT_CHANGE_BUFFER;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "pbrealtime";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "PBRT_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PBRT_`, sections split on `__`)
/// 2. TOML config file at `~/.config/pbrealtime/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend configuration.
    pub server: ServerConfig,
    /// Login credentials.
    pub auth: AuthConfig,
    /// Realtime channel configuration.
    pub realtime: RealtimeConfig,
}

/// Backend-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the backend, without the `/api` suffix.
    pub base_url: String,
    /// Name of the synchronized collection.
    pub collection: String,
    /// Name of the auth collection used for password login.
    pub auth_collection: String,
}

/// Login credentials.
///
/// Prefer `PBRT_AUTH__PASSWORD` over writing the password to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Login identity (usually an email address).
    pub identity: Option<String>,
    /// Login password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// Realtime-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Capacity of the store change notification channel.
    pub change_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            collection: "todos".to_string(),
            auth_collection: "users".to_string(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.server.collection.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.collection must not be empty".to_string(),
            });
        }

        if self.server.auth_collection.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.auth_collection must not be empty".to_string(),
            });
        }

        if self.realtime.change_buffer == 0 {
            return Err(Error::ConfigValidation {
                message: "realtime.change_buffer must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Parse the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.base_url` is not an absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server.base_url).map_err(|e| Error::ConfigValidation {
            message: format!("invalid server.base_url '{}': {e}", self.server.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigValidation {
                message: format!("server.base_url must use http or https, got '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    /// Get the configured credentials, if both parts are present.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.auth.identity, &self.auth.password) {
            (Some(identity), Some(password)) => Some((identity.as_str(), password.as_str())),
            _ => None,
        }
    }
}
