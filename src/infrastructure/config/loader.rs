use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".dockloop";

/// Environment variable prefix; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "DOCKLOOP_";

/// Smallest dispatch id length that still leaves room for generated ids.
const MIN_ID_LEN: usize = 16;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid dispatch.batch_size: must be at least 1")]
    ZeroBatchSize,

    #[error("Invalid dispatch.max_concurrency: must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid dispatch.poll_interval_secs: must be at least 1")]
    ZeroPollInterval,

    #[error("Invalid dispatch.job_timeout_secs: {timeout} is shorter than the poll interval ({interval})")]
    TimeoutShorterThanPoll { timeout: u64, interval: u64 },

    #[error("Invalid dispatch.max_id_len: {0}. Must be at least {MIN_ID_LEN}")]
    MaxIdLenTooSmall(usize),

    #[error("Invalid reasoning.top_n: must be at least 1")]
    ZeroTopN,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("output_dir cannot be empty")]
    EmptyOutputDir,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration relative to the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .dockloop/config.yaml
    /// 3. .dockloop/local.yaml
    /// 4. The explicit `--config` file, when given
    /// 5. Environment variables (`DOCKLOOP_*`, `__` separates nested keys)
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        Self::load_from(Path::new("."), explicit)
    }

    /// Same as [`ConfigLoader::load`] with the project directory at `root`.
    pub fn load_from(root: &Path, explicit: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join(CONFIG_DIR).join("config.yaml")))
            .merge(Yaml::file(root.join(CONFIG_DIR).join("local.yaml")));

        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.output_dir.trim().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        let dispatch = &config.dispatch;
        if dispatch.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if dispatch.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if dispatch.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if dispatch.job_timeout_secs < dispatch.poll_interval_secs {
            return Err(ConfigError::TimeoutShorterThanPoll {
                timeout: dispatch.job_timeout_secs,
                interval: dispatch.poll_interval_secs,
            });
        }
        if dispatch.max_id_len < MIN_ID_LEN {
            return Err(ConfigError::MaxIdLenTooSmall(dispatch.max_id_len));
        }

        if config.reasoning.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}
