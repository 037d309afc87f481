//! Configuration management for the auth sync engine.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default application base URL (can be overridden at compile time via EASYROOM_APP_URL).
pub const DEFAULT_APP_BASE_URL: &str = match option_env!("EASYROOM_APP_URL") {
    Some(url) => url,
    None => "https://app.easyroom.app",
};

/// Default external auth surface entry point (compile-time override: EASYROOM_AUTH_URL).
pub const DEFAULT_EXTERNAL_AUTH_URL: &str = match option_env!("EASYROOM_AUTH_URL") {
    Some(url) => url,
    None => "https://auth.easyroom.app/login",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL this application is served from; handoff return URLs are built on it.
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    /// External auth surface the handoff redirects to.
    #[serde(default = "default_external_auth_url")]
    pub external_auth_url: String,
}

fn default_app_base_url() -> String {
    DEFAULT_APP_BASE_URL.to_string()
}

fn default_external_auth_url() -> String {
    DEFAULT_EXTERNAL_AUTH_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            app_base_url: DEFAULT_APP_BASE_URL.to_string(),
            external_auth_url: DEFAULT_EXTERNAL_AUTH_URL.to_string(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables override file values.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Validate that the configured URLs parse and the log level is known.
    pub fn validate(&self) -> CoreResult<()> {
        Url::parse(&self.app_base_url)?;
        Url::parse(&self.external_auth_url)?;

        const KNOWN_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "warning", "error"];
        if !KNOWN_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(CoreError::Config(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("EASYROOM_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("EASYROOM_APP_URL") {
            self.app_base_url = url;
        }
        if let Ok(url) = std::env::var("EASYROOM_AUTH_URL") {
            self.external_auth_url = url;
        }
    }
}
