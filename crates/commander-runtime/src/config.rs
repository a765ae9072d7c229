#![forbid(unsafe_code)]

//! Engine configuration as data.
//!
//! [`EngineConfig`] groups every tunable of the engine. With the `config`
//! feature enabled it can be loaded from TOML or JSON; missing sections and
//! fields fall back to their defaults.
//!
//! ```toml
//! # commander.toml
//! [history]
//! max_depth = 250
//!
//! [deferred]
//! default_delay_ms = 500
//! worker_name = "commander-deferred"
//!
//! [logging]
//! emit_tracing = true
//! ```
//!
//! ```rust,ignore
//! let config = EngineConfig::from_toml_file("commander.toml")?;
//! ```

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};
use web_time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct EngineConfig {
    /// Undo/redo history limits.
    pub history: HistoryConfig,
    /// Work queue used by deferred commands.
    pub deferred: DeferredConfig,
    /// Logging behavior of the built-in logger handler.
    pub logging: LoggingConfig,
}

/// Undo/redo history limits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct HistoryConfig {
    /// Maximum number of undoable entries. Oldest entries are evicted first.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl HistoryConfig {
    /// A history limited to `max_depth` entries.
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Effectively unbounded history.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
        }
    }
}

/// Deferred command scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct DeferredConfig {
    /// Delay applied to deferred effects that do not set their own.
    pub default_delay_ms: u64,
    /// Name of the work queue thread.
    pub worker_name: String,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 500,
            worker_name: "commander-deferred".into(),
        }
    }
}

impl DeferredConfig {
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Logging behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct LoggingConfig {
    /// Whether the logger handler also emits a `tracing` event per entry.
    pub emit_tracing: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { emit_tracing: true }
    }
}

impl EngineConfig {
    /// Load from a TOML string.
    #[cfg(feature = "config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Check every parameter. All problems are reported at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.history.max_depth == 0 {
            errors.push("history.max_depth must be > 0".to_string());
        }
        if self.deferred.worker_name.trim().is_empty() {
            errors.push("deferred.worker_name must not be empty".to_string());
        }
        if self.deferred.worker_name.contains('\0') {
            errors.push("deferred.worker_name must not contain NUL".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors that can occur when loading an engine configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config")]
    Toml(toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
