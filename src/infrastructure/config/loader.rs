use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "FIELDFLOW_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_attempts: {0}. Must be between 1 and 100")]
    InvalidMaxAttempts(u32),

    #[error("Invalid {name}: must be greater than 0")]
    ZeroValue { name: &'static str },

    #[error("Invalid integrations.base_url: {0}. Must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .fieldflow/config.yaml
    /// 3. .fieldflow/local.yaml (optional developer overrides)
    /// 4. Environment variables (`FIELDFLOW_*`)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".fieldflow/config.yaml"))
            .merge(Yaml::file(".fieldflow/local.yaml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from an explicit file; environment variables still win.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// `load_from_file` when a path is given, otherwise `load`.
    pub fn load_optional(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !["json", "pretty"].contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if !["daily", "hourly", "never"].contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let automation = &config.automation;
        if automation.max_attempts == 0 || automation.max_attempts > 100 {
            return Err(ConfigError::InvalidMaxAttempts(automation.max_attempts));
        }
        for (name, value) in [
            ("automation.action_dedup_secs", automation.action_dedup_secs),
            ("automation.push_dedup_secs", automation.push_dedup_secs),
            ("automation.reminder_window_minutes", automation.reminder_window_minutes),
            ("worker.poll_interval_ms", config.worker.poll_interval_ms),
            ("integrations.timeout_secs", config.integrations.timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { name });
            }
        }
        if config.worker.batch_size == 0 {
            return Err(ConfigError::ZeroValue { name: "worker.batch_size" });
        }
        if config.worker.concurrency == 0 {
            return Err(ConfigError::ZeroValue { name: "worker.concurrency" });
        }

        if let Some(base_url) = &config.integrations.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::InvalidBaseUrl(base_url.clone()));
            }
        }

        if config.cron.secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "cron.secret cannot be blank; omit it to disable bearer auth".to_string(),
            ));
        }
        if config.cron.trusted_header.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "cron.trusted_header cannot be blank".to_string(),
            ));
        }

        Ok(())
    }
}
