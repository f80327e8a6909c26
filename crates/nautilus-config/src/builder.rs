//! Configuration builder

use crate::error::{ConfigError, Result};
use crate::types::{Config, ExtensionEntry};
use std::time::Duration;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lifecycle hook timeout; `None` waits forever
    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.runtime.operation_timeout = timeout;
        self
    }

    /// Reject registrations whose configuration fails validation
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.config.runtime.strict_validation = strict;
        self
    }

    /// Set the health check interval
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.config.health.interval = interval;
        self
    }

    /// Enable or disable health checks
    pub fn health_enabled(mut self, enabled: bool) -> Self {
        self.config.health.enabled = enabled;
        self
    }

    /// Add an extension entry, replacing one with the same id
    pub fn extension(mut self, entry: ExtensionEntry) -> Self {
        self.config.extensions.retain(|e| e.id != entry.id);
        self.config.extensions.push(entry);
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        crate::validator::validate_config(&self.config)
            .map_err(|e| ConfigError::invalid(format!("builder produced invalid config: {e}")))?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .operation_timeout(Some(Duration::from_secs(5)))
            .health_interval(Duration::from_secs(10))
            .extension(ExtensionEntry::new("cache").setting("max_entries", 10))
            .extension(ExtensionEntry::new("cache").setting("max_entries", 20))
            .build()
            .unwrap();

        assert_eq!(config.runtime.operation_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.health.interval, Duration::from_secs(10));
        assert_eq!(config.extensions.len(), 1);
        assert_eq!(config.extensions[0].settings["max_entries"], 20);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let result = ConfigBuilder::new().log_level("loud").build();
        assert!(result.is_err());
    }
}
