//! Configuration validation

use crate::error::{ConfigError, Result};
use crate::Config;
use std::collections::HashSet;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_runtime(config)?;
    validate_health(config)?;
    validate_extensions(config)?;
    validate_logging(config)?;

    Ok(())
}

fn validate_runtime(config: &Config) -> Result<()> {
    if config.runtime.operation_timeout.is_some_and(|t| t.is_zero()) {
        tracing::warn!("operation_timeout is 0, lifecycle hooks will not be bounded");
    }

    Ok(())
}

fn validate_health(config: &Config) -> Result<()> {
    let health = &config.health;

    if health.enabled && health.interval.is_zero() {
        return Err(ConfigError::invalid(
            "health.interval must be > 0 when health checks are enabled",
        ));
    }

    if health.unhealthy_threshold == 0 {
        return Err(ConfigError::invalid("health.unhealthy_threshold must be > 0"));
    }

    if health.auto_recovery && health.recovery_retries > 0 && health.recovery_interval.is_zero() {
        return Err(ConfigError::invalid(
            "health.recovery_interval must be > 0 when auto recovery is enabled",
        ));
    }

    if health.auto_recovery && health.recovery_retries == 0 {
        tracing::warn!("auto_recovery is enabled but recovery_retries is 0");
    }

    Ok(())
}

fn validate_extensions(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for entry in &config.extensions {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::invalid("extension id cannot be empty"));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::invalid(format!(
                "duplicate extension entry: {}",
                entry.id
            )));
        }

        if entry.enabled == Some(false) {
            tracing::debug!(extension = %entry.id, "Extension disabled by configuration");
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::invalid(format!(
            "invalid log level: {} (must be one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::invalid(format!(
            "invalid log format: {} (must be text or json)",
            config.logging.format
        )));
    }

    Ok(())
}
