//! Core error types for deferloop operations.
//!
//! Only failures the registering caller must see are modelled here. Callback
//! failures and stale timer firings are absorbed by the event loop and never
//! become an `Error`.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for deferloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // Scheduling errors
    #[error("scheduling unavailable: {reason}")]
    SchedulingUnavailable { reason: String },

    #[error("timer id space exhausted")]
    IdSpaceExhausted,

    #[error("invalid delay: {millis}ms")]
    InvalidDelay { millis: f64 },

    #[error("failed to start timer pool: {reason}")]
    PoolStartFailed { reason: String },

    // Configuration errors
    #[error("failed to read config '{path}': {reason}")]
    ConfigReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    ConfigParseFailed { reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a scheduling unavailable error.
    pub fn scheduling_unavailable(reason: impl Into<String>) -> Self {
        Self::SchedulingUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an invalid delay error.
    #[must_use]
    pub const fn invalid_delay(millis: f64) -> Self {
        Self::InvalidDelay { millis }
    }

    /// Create a pool start error.
    pub fn pool_start_failed(reason: impl Into<String>) -> Self {
        Self::PoolStartFailed {
            reason: reason.into(),
        }
    }

    /// Create a config read error.
    pub fn config_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a config parse error.
    pub fn config_parse_failed(reason: impl Into<String>) -> Self {
        Self::ConfigParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this error means the timer pool refused new work.
    #[must_use]
    pub const fn is_scheduling_unavailable(&self) -> bool {
        matches!(self, Self::SchedulingUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_unavailable_display() {
        let err = Error::scheduling_unavailable("pool shut down");
        assert!(err.to_string().contains("pool shut down"));
        assert!(err.is_scheduling_unavailable());
    }

    #[test]
    fn test_invalid_delay_display() {
        let err = Error::invalid_delay(-5.0);
        assert!(err.to_string().contains("-5"));
        assert!(!err.is_scheduling_unavailable());
    }

    #[test]
    fn test_config_read_failed_includes_path() {
        let err = Error::config_read_failed("/etc/deferloop.toml", "not found");
        let message = err.to_string();
        assert!(message.contains("/etc/deferloop.toml"));
        assert!(message.contains("not found"));
    }
}
