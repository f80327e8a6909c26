//! Exposes a loaded [`Config`] to the runtime

use crate::types::Config;
use nautilus_extension_api::ExtensionConfigPatch;
use nautilus_extension_runtime::HostConfigSource;
use serde_json::Value;
use std::time::Duration;

fn millis(duration: Duration) -> Value {
    Value::from(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl HostConfigSource for Config {
    fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            "runtime.operation_timeout_ms" => {
                millis(self.runtime.operation_timeout.unwrap_or(Duration::ZERO))
            }
            "runtime.strict_validation" => Value::from(self.runtime.strict_validation),
            "health.enabled" => Value::from(self.health.enabled),
            "health.interval_ms" => millis(self.health.interval),
            "health.unhealthy_threshold" => Value::from(self.health.unhealthy_threshold),
            "health.auto_recovery" => Value::from(self.health.auto_recovery),
            "health.recovery_retries" => Value::from(self.health.recovery_retries),
            "health.recovery_interval_ms" => millis(self.health.recovery_interval),
            "logging.level" => Value::from(self.logging.level.clone()),
            "logging.format" => Value::from(self.logging.format.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn extension_config(&self, extension_id: &str) -> Option<ExtensionConfigPatch> {
        self.extension(extension_id).map(|entry| entry.to_patch())
    }
}
