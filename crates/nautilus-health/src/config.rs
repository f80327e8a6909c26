//! Health supervision settings

use nautilus_extension_runtime::HostConfigSource;
use std::time::Duration;

/// Health supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Whether the periodic check runs at all
    pub enabled: bool,

    /// Time between ticks
    pub interval: Duration,

    /// Consecutive failures before an extension counts as unhealthy
    pub unhealthy_threshold: u32,

    /// Restart unhealthy extensions automatically
    pub auto_recovery: bool,

    /// Restart attempts per recovery
    pub recovery_retries: u32,

    /// Pause between restart attempts
    pub recovery_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            unhealthy_threshold: 3,
            auto_recovery: true,
            recovery_retries: 3,
            recovery_interval: Duration::from_secs(5),
        }
    }
}

impl HealthConfig {
    /// Read the `health.*` keys, falling back to the defaults
    pub fn from_host(host: &dyn HostConfigSource) -> Self {
        let defaults = Self::default();

        Self {
            enabled: host.get_bool("health.enabled").unwrap_or(defaults.enabled),
            interval: host
                .get_duration_ms("health.interval_ms")
                .unwrap_or(defaults.interval),
            unhealthy_threshold: host
                .get_u64("health.unhealthy_threshold")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.unhealthy_threshold),
            auto_recovery: host
                .get_bool("health.auto_recovery")
                .unwrap_or(defaults.auto_recovery),
            recovery_retries: host
                .get_u64("health.recovery_retries")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.recovery_retries),
            recovery_interval: host
                .get_duration_ms("health.recovery_interval_ms")
                .unwrap_or(defaults.recovery_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_extension_runtime::StaticHostConfig;

    #[test]
    fn test_defaults() {
        let config = HealthConfig::from_host(&StaticHostConfig::new());
        assert_eq!(config, HealthConfig::default());
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.recovery_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_from_host() {
        let host = StaticHostConfig::new()
            .set("health.enabled", false)
            .set("health.interval_ms", 250)
            .set("health.unhealthy_threshold", 5)
            .set("health.auto_recovery", false)
            .set("health.recovery_retries", 1)
            .set("health.recovery_interval_ms", 100);

        let config = HealthConfig::from_host(&host);
        assert!(!config.enabled);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.unhealthy_threshold, 5);
        assert!(!config.auto_recovery);
        assert_eq!(config.recovery_retries, 1);
        assert_eq!(config.recovery_interval, Duration::from_millis(100));
    }
}
