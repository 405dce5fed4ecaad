//! Timer pool configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration for the background timer pool.
///
/// ```toml
/// worker_threads = 4
/// max_pending_triggers = 50000
/// thread_name = "script-timers"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of worker threads waiting out delays.
    pub worker_threads: usize,
    /// Maximum number of armed, not-yet-fired triggers across all loops.
    pub max_pending_triggers: usize,
    /// Name given to worker threads.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_pending_triggers: 100_000,
            thread_name: "deferloop-timer".to_string(),
        }
    }
}

impl PoolConfig {
    /// Parse a config from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParseFailed` for malformed TOML or unknown keys, and
    /// `InvalidConfig` if the parsed values fail validation.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::config_parse_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigReadFailed` if the file cannot be read, otherwise as
    /// [`PoolConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&source)
    }

    /// Check the values can build a pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero workers, zero capacity or an empty
    /// thread name.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::invalid_config("worker_threads must be at least 1"));
        }
        if self.max_pending_triggers == 0 {
            return Err(Error::invalid_config(
                "max_pending_triggers must be at least 1",
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(Error::invalid_config("thread_name must not be empty"));
        }
        Ok(())
    }

    /// Set the worker thread count.
    #[must_use]
    pub const fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Set the pending trigger capacity.
    #[must_use]
    pub const fn with_max_pending_triggers(mut self, max_pending_triggers: usize) -> Self {
        self.max_pending_triggers = max_pending_triggers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.max_pending_triggers, 100_000);
        assert_eq!(config.thread_name, "deferloop-timer");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = PoolConfig::from_toml_str("worker_threads = 8")?;
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.max_pending_triggers, 100_000);
        Ok(())
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = PoolConfig::from_toml_str("workers = 8");
        assert!(matches!(result, Err(Error::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PoolConfig::from_toml_str("worker_threads = 0");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PoolConfig::default().with_max_pending_triggers(0);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_load_from_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "worker_threads = 3")?;
        writeln!(file, "thread_name = \"script-timers\"")?;

        let config = PoolConfig::load(file.path())?;
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.thread_name, "script-timers");
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = PoolConfig::load("/nonexistent/deferloop/pool.toml");
        assert!(matches!(result, Err(Error::ConfigReadFailed { .. })));
    }
}
