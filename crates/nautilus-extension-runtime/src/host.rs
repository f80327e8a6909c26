//! Host configuration source
//!
//! The runtime reads host tunables as flat key/value pairs and per-extension
//! configuration blobs. Keys read by the runtime itself:
//!
//! | key | type |
//! |---|---|
//! | `runtime.operation_timeout_ms` | number, 0 disables the timeout |
//! | `runtime.strict_validation` | bool |
//! | `health.enabled` | bool |
//! | `health.interval_ms` | number |
//! | `health.unhealthy_threshold` | number |
//! | `health.auto_recovery` | bool |
//! | `health.recovery_retries` | number |
//! | `health.recovery_interval_ms` | number |

use nautilus_extension_api::ExtensionConfigPatch;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Source of host-supplied configuration
pub trait HostConfigSource: Send + Sync + fmt::Debug {
    /// Raw value for a key
    fn get(&self, key: &str) -> Option<Value>;

    /// Configuration blob for an extension
    fn extension_config(&self, extension_id: &str) -> Option<ExtensionConfigPatch>;

    /// Boolean value for a key
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Unsigned integer value for a key
    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    /// Duration stored as milliseconds
    fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }
}

/// In-memory host configuration
#[derive(Debug, Clone, Default)]
pub struct StaticHostConfig {
    values: HashMap<String, Value>,
    extensions: HashMap<String, ExtensionConfigPatch>,
}

impl StaticHostConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set the configuration blob for an extension
    pub fn extension(mut self, id: impl Into<String>, config: ExtensionConfigPatch) -> Self {
        self.extensions.insert(id.into(), config);
        self
    }
}

impl HostConfigSource for StaticHostConfig {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn extension_config(&self, extension_id: &str) -> Option<ExtensionConfigPatch> {
        self.extensions.get(extension_id).cloned()
    }
}
