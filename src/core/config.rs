//! Configuration management for Intellimetric.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{IntellimetricError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration for Intellimetric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parser pool configuration
    pub pool: PoolConfig,
    /// Input file configuration
    pub input: InputConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Parser pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Run parse tasks on background units; false forces the synchronous path
    pub parallel: bool,
    /// Fixed unit count, overriding the core-count heuristic
    pub units: Option<usize>,
    /// Upper bound for the core-count heuristic
    pub max_units: usize,
    /// Payloads above this size get periodic liveness pings
    pub progress_ping_threshold_bytes: u64,
    /// Interval between liveness pings
    #[serde(with = "humantime_serde")]
    pub progress_ping_interval: Duration,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

/// Input file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Maximum accepted file size in bytes
    pub max_file_bytes: u64,
    /// Accepted file extensions, lowercase and without the dot
    pub allowed_extensions: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pool: PoolConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            parallel: true,
            units: None,
            max_units: 4,
            progress_ping_threshold_bytes: 5 * 1024 * 1024, // 5MB
            progress_ping_interval: Duration::from_millis(500),
            event_capacity: 1024,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            max_file_bytes: 100 * 1024 * 1024, // 100 MiB
            allowed_extensions: vec!["json".to_string(), "gz".to_string(), "otel".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl PoolConfig {
    /// Number of units the pool should start.
    ///
    /// Without an explicit override this is `available_parallelism - 1`
    /// clamped to `1..=max_units`.
    pub fn resolved_units(&self) -> usize {
        if let Some(units) = self.units {
            return units;
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        cores.saturating_sub(1).clamp(1, self.max_units.max(1))
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_units == 0 {
            return Err(IntellimetricError::config("max_units must be greater than 0"));
        }

        if let Some(units) = self.pool.units {
            if units == 0 || units > self.pool.max_units {
                return Err(IntellimetricError::config(format!(
                    "units must be between 1 and {}, got {}",
                    self.pool.max_units, units
                )));
            }
        }

        if self.pool.progress_ping_interval.is_zero() {
            return Err(IntellimetricError::config(
                "progress_ping_interval must be greater than 0",
            ));
        }

        if self.pool.event_capacity == 0 {
            return Err(IntellimetricError::config("event_capacity must be greater than 0"));
        }

        if self.input.max_file_bytes == 0 {
            return Err(IntellimetricError::config("max_file_bytes must be greater than 0"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| IntellimetricError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable background units
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.pool.parallel = parallel;
        self
    }

    /// Set a fixed unit count
    pub fn units(mut self, units: usize) -> Self {
        self.config.pool.units = Some(units);
        self
    }

    /// Set the liveness ping threshold
    pub fn progress_ping_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.pool.progress_ping_threshold_bytes = bytes;
        self
    }

    /// Set the liveness ping interval
    pub fn progress_ping_interval(mut self, interval: Duration) -> Self {
        self.config.pool.progress_ping_interval = interval;
        self
    }

    /// Set max input file size
    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.input.max_file_bytes = bytes;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
