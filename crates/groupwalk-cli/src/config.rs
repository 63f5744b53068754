//! Configuration management for the groupwalk CLI.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Command-line flags are applied on top of the loaded configuration by the
//! binary.
//!
//! # Example
//!
//! ```ignore
//! use groupwalk_cli::config::GroupwalkConfig;
//!
//! // Load from file with env overrides
//! let config = GroupwalkConfig::load("groupwalk.yaml")?;
//!
//! // Or load from environment only
//! let config = GroupwalkConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use groupwalk_domain::resolver::DEFAULT_LEVELS_DEEP_TO_GO;
use groupwalk_domain::{IdentifierPreference, TraversalConfig};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GroupwalkConfig {
    /// Traversal settings
    #[serde(default)]
    pub traversal: TraversalSettings,

    /// Directory backend settings
    #[serde(default)]
    pub directory: DirectorySettings,

    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Traversal engine settings.
///
/// Environment variables use the `GROUPWALK_` prefix and `__` as the nested
/// key separator, e.g. `GROUPWALK_TRAVERSAL__MAX_CONCURRENCY=16`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TraversalSettings {
    /// Maximum directory calls in flight per traversal
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for one root in seconds (unbounded when absent)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Depth bound for expanded mode
    #[serde(default = "default_levels_deep_to_go")]
    pub levels_deep_to_go: u32,

    /// Depth bound for flat mode (unbounded when absent)
    #[serde(default)]
    pub max_depth: Option<u32>,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_secs: None,
            levels_deep_to_go: default_levels_deep_to_go(),
            max_depth: None,
        }
    }
}

fn default_max_concurrency() -> usize {
    TraversalConfig::default().max_concurrency
}

fn default_levels_deep_to_go() -> u32 {
    DEFAULT_LEVELS_DEEP_TO_GO
}

/// Directory backend settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DirectorySettings {
    /// JSON fixture loaded into the in-memory directory
    #[serde(default)]
    pub fixture_path: Option<String>,
}

/// Output settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OutputSettings {
    /// Identifier printed for objects: "guid", "dn" or "address"
    #[serde(default = "default_identifier")]
    pub identifier: String,

    /// Collapse flat output into one record per root
    #[serde(default)]
    pub collapse: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            collapse: false,
        }
    }
}

fn default_identifier() -> String {
    "guid".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl GroupwalkConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `GROUPWALK_` and use `__` as
    /// separator, e.g. `GROUPWALK_OUTPUT__IDENTIFIER=dn` overrides
    /// `output.identifier`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&GroupwalkConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let loaded: GroupwalkConfig = config.try_deserialize()?;
        loaded.validate()?;

        Ok(loaded)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&GroupwalkConfig::default())?)
            .add_source(env_source())
            .build()?;

        let loaded: GroupwalkConfig = config.try_deserialize()?;
        loaded.validate()?;

        Ok(loaded)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.traversal.max_concurrency == 0 {
            return Err(invalid("traversal.max_concurrency must be greater than 0"));
        }

        if self.traversal.levels_deep_to_go == 0 {
            return Err(invalid("traversal.levels_deep_to_go must be greater than 0"));
        }

        if self.traversal.max_depth == Some(0) {
            return Err(invalid("traversal.max_depth must be greater than 0"));
        }

        if self.traversal.timeout_secs == Some(0) {
            return Err(invalid("traversal.timeout_secs must be greater than 0"));
        }

        if let Err(e) = self.output.identifier.parse::<IdentifierPreference>() {
            return Err(invalid(&format!("output.identifier: {e}")));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Engine configuration derived from the traversal settings.
    pub fn traversal_config(&self) -> TraversalConfig {
        let config = TraversalConfig::default().with_max_concurrency(self.traversal.max_concurrency);
        match self.traversal.timeout_secs {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// Preferred output identifier; the default when unparseable.
    pub fn identifier_preference(&self) -> IdentifierPreference {
        self.output.identifier.parse().unwrap_or_default()
    }
}

/// Environment source: `GROUPWALK_TRAVERSAL__MAX_CONCURRENCY` -> `traversal.max_concurrency`.
fn env_source() -> Environment {
    Environment::with_prefix("GROUPWALK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn invalid(message: &str) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.to_string(),
    }
}
