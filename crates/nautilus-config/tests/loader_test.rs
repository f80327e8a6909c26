//! File-based loading tests

use nautilus_config::{load_and_merge, load_config, ConfigError};
use nautilus_extension_runtime::{ExtensionRegistry, HostConfigSource};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_layered_files() {
    let dir = TempDir::new().unwrap();
    let base = write(
        &dir,
        "base.yaml",
        r#"
health:
  interval: 30s
  unhealthy_threshold: 3
extensions:
  - id: memory-cache
    priority: 50
    settings:
      max_entries: 100
"#,
    );
    let production = write(
        &dir,
        "production.toml",
        r#"
[health]
interval = "10s"

[[extensions]]
id = "memory-cache"

[extensions.settings]
max_entries = 5000
"#,
    );
    let local = write(&dir, "local.json", r#"{ "logging": { "format": "json" } }"#);

    let config = load_and_merge(vec![base, production, local]).unwrap();

    assert_eq!(config.health.interval, Duration::from_secs(10));
    assert_eq!(config.health.unhealthy_threshold, 3);
    assert_eq!(config.logging.format, "json");

    let cache = config.extension("memory-cache").unwrap();
    assert_eq!(cache.priority, Some(50));
    assert_eq!(cache.settings["max_entries"], 5000);
}

#[test]
fn test_merged_result_is_validated() {
    let dir = TempDir::new().unwrap();
    let base = write(&dir, "base.yaml", "health:\n  unhealthy_threshold: 3\n");
    let broken = write(&dir, "override.yaml", "health:\n  unhealthy_threshold: 0\n");

    let result = load_and_merge(vec![base, broken]);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_missing_file() {
    let result = load_config("/nonexistent/nautilus.yaml");
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_no_files() {
    let result = load_and_merge(Vec::<PathBuf>::new());
    assert!(matches!(result, Err(ConfigError::Empty)));
}

#[tokio::test]
async fn test_config_drives_registry() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "nautilus.yaml",
        r#"
runtime:
  operation_timeout: 250ms
health:
  interval: 2s
"#,
    );
    let config = Arc::new(load_config(path).unwrap());
    assert_eq!(config.get_u64("runtime.operation_timeout_ms"), Some(250));

    let registry = ExtensionRegistry::builder().host_config(config).build();
    assert_eq!(
        registry.lifecycle().config().operation_timeout,
        Some(Duration::from_millis(250))
    );
    assert_eq!(
        registry.host_config().get_duration_ms("health.interval_ms"),
        Some(Duration::from_secs(2))
    );
}
