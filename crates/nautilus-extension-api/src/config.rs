//! Per-extension configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Priority presets (lower value wins)
pub mod priority {
    /// Highest precedence
    pub const HIGHEST: i32 = 0;
    /// High precedence
    pub const HIGH: i32 = 25;
    /// Default precedence
    pub const NORMAL: i32 = 50;
    /// Low precedence
    pub const LOW: i32 = 75;
    /// Lowest precedence
    pub const LOWEST: i32 = 100;
}

/// Live configuration of an extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Whether the extension is loaded on registration
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Precedence among extensions of the same type (lower wins)
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Extension-specific settings
    #[serde(default)]
    pub settings: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    priority::NORMAL
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: priority::NORMAL,
            settings: Map::new(),
        }
    }
}

impl ExtensionConfig {
    /// Get a setting
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Set a setting, builder style
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Set the priority, builder style
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enabled flag, builder style
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Partial configuration update
///
/// Absent fields keep the value of the configuration being patched; present
/// settings keys replace the existing ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfigPatch {
    /// New enabled flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// New priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Settings to overlay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl ExtensionConfigPatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled flag
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Overlay a single setting
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.priority.is_none()
            && self.settings.as_ref().map_or(true, Map::is_empty)
    }
}

impl From<ExtensionConfig> for ExtensionConfigPatch {
    fn from(config: ExtensionConfig) -> Self {
        Self {
            enabled: Some(config.enabled),
            priority: Some(config.priority),
            settings: Some(config.settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = ExtensionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.priority, priority::NORMAL);
        assert!(config.settings.is_empty());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ExtensionConfig = serde_json::from_value(json!({
            "settings": { "ttl": 60 }
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.priority, 50);
        assert_eq!(config.setting("ttl"), Some(&json!(60)));
    }

    #[test]
    fn test_patch_builder() {
        let patch = ExtensionConfigPatch::new().priority(10).setting("ttl", 30);
        assert_eq!(patch.priority, Some(10));
        assert_eq!(patch.enabled, None);
        assert!(!patch.is_empty());
        assert!(ExtensionConfigPatch::new().is_empty());
    }
}
