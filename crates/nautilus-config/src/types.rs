//! Configuration types

use nautilus_extension_api::ExtensionConfigPatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Health supervision
    #[serde(default)]
    pub health: HealthSettings,

    /// Per-extension configuration
    #[serde(default)]
    pub extensions: Vec<ExtensionEntry>,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Entry for an extension id
    pub fn extension(&self, id: &str) -> Option<&ExtensionEntry> {
        self.extensions.iter().find(|e| e.id == id)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Upper bound for each lifecycle hook; `null` waits forever
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Option<Duration>,

    /// Reject registrations whose configuration fails validation
    #[serde(default)]
    pub strict_validation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
            strict_validation: false,
        }
    }
}

fn default_operation_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

/// Health supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSettings {
    /// Run periodic health checks
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time between checks
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Consecutive failures before an extension is unhealthy
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,

    /// Restart unhealthy extensions
    #[serde(default = "default_true")]
    pub auto_recovery: bool,

    /// Restart attempts per recovery
    #[serde(default = "default_retries")]
    pub recovery_retries: u32,

    /// Pause between restart attempts
    #[serde(default = "default_recovery_interval", with = "humantime_serde")]
    pub recovery_interval: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_interval(),
            unhealthy_threshold: default_threshold(),
            auto_recovery: true,
            recovery_retries: default_retries(),
            recovery_interval: default_recovery_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_threshold() -> u32 {
    3
}

fn default_retries() -> u32 {
    3
}

fn default_recovery_interval() -> Duration {
    Duration::from_secs(5)
}

/// Configuration blob for one extension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionEntry {
    /// Extension id
    pub id: String,

    /// Load on registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Precedence among extensions of the same type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Extension-specific settings
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

impl ExtensionEntry {
    /// Create an empty entry
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: None,
            priority: None,
            settings: Map::new(),
        }
    }

    /// Set a setting
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Patch applied on top of the extension defaults
    pub fn to_patch(&self) -> ExtensionConfigPatch {
        ExtensionConfigPatch {
            enabled: self.enabled,
            priority: self.priority,
            settings: (!self.settings.is_empty()).then(|| self.settings.clone()),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_json::from_value(json!({})).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.runtime.operation_timeout, Some(Duration::from_secs(30)));
        assert!(config.health.enabled);
        assert_eq!(config.health.unhealthy_threshold, 3);
        assert_eq!(config.health.recovery_interval, Duration::from_secs(5));
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_null_timeout_disables() {
        let config: Config =
            serde_json::from_value(json!({ "runtime": { "operation_timeout": null } })).unwrap();
        assert_eq!(config.runtime.operation_timeout, None);
    }

    #[test]
    fn test_entry_to_patch() {
        let entry = ExtensionEntry {
            priority: Some(10),
            ..ExtensionEntry::new("cache")
        };
        let patch = entry.to_patch();
        assert_eq!(patch.priority, Some(10));
        assert!(patch.enabled.is_none());
        assert!(patch.settings.is_none());

        let patch = ExtensionEntry::new("cache").setting("ttl", 5).to_patch();
        assert_eq!(patch.settings.unwrap().get("ttl"), Some(&json!(5)));
    }
}
