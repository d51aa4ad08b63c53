//! TOML loading and the `[shared]` table.
//!
//! The relay reads its file once, before any component is configured:
//!
//! ```rust,no_run
//! use relay_common::config::ConfigLoader;
//! use relay_common::relay::config::RelayConfig;
//! use std::path::Path;
//!
//! let config = RelayConfig::load(Path::new("config/relay.toml")).unwrap();
//! println!("{} components", config.components.len());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Why a relay file could not be turned into a configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// Unreadable file, bad TOML or an unknown field.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but the values do not make a runnable relay.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// `log_level` of the `[shared]` table. `--verbose` overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-record detail from producers.
    Trace,
    /// Per-message and per-connection detail.
    Debug,
    /// Lifecycle transitions.
    #[default]
    Info,
    /// Rejected input and teardown problems.
    Warn,
    /// Failed transitions only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// The `[shared]` table: instance name and log level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Default log level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance name, used in the startup log line.
    pub service_name: String,
}

impl SharedConfig {
    /// Rejects a blank `service_name`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML loading for any deserializable config type.
///
/// Loading does not validate; callers run `validate()` on the result.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            }
        })?;

        Self::parse(&content)
    }

    /// Parse TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
