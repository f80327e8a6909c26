//! Configuration loading

use crate::error::{ConfigError, Result};
use crate::{Config, ConfigFormat};
use regex::Regex;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let document = read_document(path.as_ref())?;
    from_document(document)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    let document = parse_document(content, format)?;
    from_document(document)
}

/// Load a file and validate it
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}

/// Load and merge multiple configuration files
///
/// Files are merged in order, with later files overriding earlier ones.
/// This enables layered configuration:
/// - base.yaml (common defaults)
/// - production.yaml (env-specific)
/// - local.toml (developer overrides)
///
/// # Example
///
/// ```no_run
/// use nautilus_config::load_and_merge;
///
/// let config = load_and_merge(vec!["config/base.yaml", "config/production.yaml"])?;
/// # Ok::<(), nautilus_config::ConfigError>(())
/// ```
pub fn load_and_merge<P: AsRef<Path>>(paths: Vec<P>) -> Result<Config> {
    if paths.is_empty() {
        return Err(ConfigError::Empty);
    }

    let documents = paths
        .iter()
        .map(|p| read_document(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let merged = crate::merger::merge_documents(documents)?;
    let config = from_document(merged)?;
    crate::validator::validate_config(&config)?;

    Ok(config)
}

fn read_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = ConfigFormat::from_path(path)?;

    debug!(path = %path.display(), format = ?format, "Loading configuration file");
    parse_document(&content, format)
}

fn parse_document(content: &str, format: ConfigFormat) -> Result<Value> {
    let expanded = expand_env_vars(content)?;

    let document: Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?,
        ConfigFormat::Toml => toml::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "TOML",
            message: e.to_string(),
        })?,
        ConfigFormat::Json => serde_json::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?,
    };

    // An empty YAML file parses to null
    Ok(match document {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

fn from_document(document: Value) -> Result<Config> {
    serde_json::from_value(document).map_err(|e| ConfigError::Parse {
        format: "configuration",
        message: e.to_string(),
    })
}

/// Expand environment variables in configuration text
///
/// Supports `${VAR}` and `${VAR:-default}`.
pub fn expand_env_vars(content: &str) -> Result<String> {
    // Matches ${VAR} or ${VAR:-default}
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| ConfigError::invalid(format!("invalid env pattern: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = name.as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match (env::var(var_name), default_value) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => return Err(ConfigError::UnsetVariable(var_name.to_string())),
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const YAML_CONFIG: &str = r#"
runtime:
  operation_timeout: 10s
  strict_validation: true

health:
  interval: 15s
  unhealthy_threshold: 5

extensions:
  - id: memory-cache
    priority: 10
    settings:
      max_entries: 1000

logging:
  level: debug
  format: json
"#;

    #[test]
    fn test_load_yaml() {
        let config = load_from_str(YAML_CONFIG, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.runtime.operation_timeout, Some(Duration::from_secs(10)));
        assert!(config.runtime.strict_validation);
        assert_eq!(config.health.interval, Duration::from_secs(15));
        assert_eq!(config.health.unhealthy_threshold, 5);
        assert_eq!(config.health.recovery_retries, 3);
        assert_eq!(config.extensions.len(), 1);
        assert_eq!(config.extensions[0].priority, Some(10));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[health]
enabled = false

[[extensions]]
id = "memory-cache"
enabled = true

[extensions.settings]
max_entries = 50
"#;
        let config = load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert!(!config.health.enabled);
        assert_eq!(
            config.extension("memory-cache").unwrap().settings["max_entries"],
            50
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = load_from_str("", ConfigFormat::Yaml).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = load_from_str("invalid: [yaml", ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Parse { format: "YAML", .. })));
    }

    #[test]
    fn test_bad_duration() {
        let result = load_from_str("health:\n  interval: soon\n", ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("NAUTILUS_TEST_INTERVAL", "45s");

        let config = load_from_str(
            "health:\n  interval: ${NAUTILUS_TEST_INTERVAL}\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.health.interval, Duration::from_secs(45));

        env::remove_var("NAUTILUS_TEST_INTERVAL");
    }

    #[test]
    fn test_env_var_with_default() {
        env::remove_var("NAUTILUS_UNDEFINED_LEVEL");

        let config = load_from_str(
            "logging:\n  level: ${NAUTILUS_UNDEFINED_LEVEL:-warn}\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_missing_env_var_no_default() {
        env::remove_var("NAUTILUS_MISSING_VAR");

        let result = load_from_str(
            "logging:\n  level: ${NAUTILUS_MISSING_VAR}\n",
            ConfigFormat::Yaml,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("NAUTILUS_MISSING_VAR"));
    }

    #[test]
    fn test_multiple_env_vars() {
        env::set_var("NAUTILUS_DB_HOST", "localhost");
        env::set_var("NAUTILUS_DB_PORT", "5432");

        let expanded =
            expand_env_vars("postgres://${NAUTILUS_DB_HOST}:${NAUTILUS_DB_PORT}/cache").unwrap();
        assert_eq!(expanded, "postgres://localhost:5432/cache");

        env::remove_var("NAUTILUS_DB_HOST");
        env::remove_var("NAUTILUS_DB_PORT");
    }
}
