//! Toolkit configuration.
//!
//! Every section deserializes with defaults, so an empty document (or no
//! document) yields the standard setup: a 50-entry ledger, 10 recent
//! outcomes, 3 retry attempts starting at 100ms and doubling, and virtual
//! time.
//!
//! With the `config-file` feature, configurations can be read from TOML:
//!
//! ```toml
//! [monitor]
//! ledger_capacity = 100
//!
//! [retry]
//! max_attempts = 5
//! initial_delay_ms = 50
//!
//! [runtime]
//! time = "wall"
//! seed = 42
//! ```

use crate::error::ContractViolation;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default number of outcomes kept per operation.
pub const DEFAULT_LEDGER_CAPACITY: usize = 50;
/// Default number of outcomes reported as recent.
pub const DEFAULT_RECENT_WINDOW: usize = 10;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting broke a constructor contract: a zero size limit or a
    /// malformed retry section.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ContractViolation),
    /// The document could not be parsed.
    #[cfg(feature = "config-file")]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings for a [`Monitor`](crate::observability::Monitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum outcomes kept per operation before FIFO eviction.
    pub ledger_capacity: usize,
    /// Number of most recent outcomes reported by `stats`.
    pub recent_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }
}

impl MonitorConfig {
    /// Validates the monitor settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger_capacity == 0 {
            return Err(ContractViolation::ZeroCapacity {
                what: "monitor.ledger_capacity",
            }
            .into());
        }
        if self.recent_window == 0 {
            return Err(ContractViolation::ZeroCapacity {
                what: "monitor.recent_window",
            }
            .into());
        }
        Ok(())
    }
}

/// Unvalidated retry settings; convert with
/// [`RetryPolicy::try_from`](crate::combinator::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Factor applied to the wait after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicyConfig {
    /// The initial delay as a [`Duration`].
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// How the runtime measures and advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// Deterministic time that jumps to the next timer when every task is idle.
    #[default]
    Virtual,
    /// Real time; the runtime parks the thread until the next deadline.
    Wall,
}

/// Settings for a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Time mode.
    pub time: TimeMode,
    /// Seed for deterministic entropy; OS entropy when absent.
    pub seed: Option<u64>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Monitor settings.
    pub monitor: MonitorConfig,
    /// Default retry policy.
    pub retry: RetryPolicyConfig,
    /// Runtime settings.
    pub runtime: RuntimeConfig,
}

impl ToolkitConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        crate::combinator::RetryPolicy::try_from(self.retry)?;
        Ok(())
    }

    /// Parses and validates a TOML document.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("defaults_are_valid");
        let config = ToolkitConfig::default();
        assert_eq!(config.monitor.ledger_capacity, 50);
        assert_eq!(config.monitor.recent_window, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(100));
        assert_eq!(config.runtime.time, TimeMode::Virtual);
        assert!(config.validate().is_ok());
        crate::test_complete!("defaults_are_valid");
    }

    #[test]
    fn zero_capacity_rejected() {
        crate::test_utils::init_test_logging();
        let mut config = ToolkitConfig::default();
        config.monitor.ledger_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ContractViolation::ZeroCapacity {
                what: "monitor.ledger_capacity"
            })
        ));
    }

    #[test]
    fn bad_retry_section_rejected() {
        crate::test_utils::init_test_logging();
        let mut config = ToolkitConfig::default();
        config.retry.backoff_multiplier = 0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ContractViolation::InvalidBackoffMultiplier(_))
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        crate::test_utils::init_test_logging();
        let config: ToolkitConfig =
            serde_json::from_str(r#"{"runtime":{"time":"wall","seed":7}}"#).unwrap();
        assert_eq!(config.runtime.time, TimeMode::Wall);
        assert_eq!(config.runtime.seed, Some(7));
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_document_parses() {
        crate::test_utils::init_test_logging();
        let config = ToolkitConfig::from_toml_str(
            "[monitor]\nledger_capacity = 5\n\n[retry]\nmax_attempts = 4\n",
        )
        .unwrap();
        assert_eq!(config.monitor.ledger_capacity, 5);
        assert_eq!(config.monitor.recent_window, 10);
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_syntax_error_is_parse_error() {
        crate::test_utils::init_test_logging();
        let err = ToolkitConfig::from_toml_str("[monitor\n").unwrap_err();
        let ConfigError::Parse(parse) = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert!(parse.span().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }
}
