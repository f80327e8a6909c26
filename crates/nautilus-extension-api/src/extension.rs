//! Core extension trait and identity types

use crate::config::ExtensionConfig;
use crate::context::ExtensionContext;
use crate::error::{BoxError, HookResult};
use crate::health::HealthCheckResult;
use crate::schema::ExtensionCapabilities;
use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contract every extension implements
///
/// Hooks take `&self`: an extension is shared behind an `Arc` for its whole
/// lifetime and keeps whatever mutable state it needs behind its own locks.
/// Status and configuration are owned by the runtime and read through the
/// [`ExtensionContext`].
#[async_trait]
pub trait Extension: Send + Sync + fmt::Debug {
    /// Immutable identity
    fn meta(&self) -> &ExtensionMeta;

    /// Capability category, e.g. `storage` or `notification`
    fn extension_type(&self) -> &str;

    /// Declared capabilities, including the configuration schema
    fn capabilities(&self) -> ExtensionCapabilities {
        ExtensionCapabilities::default()
    }

    /// Called while LOADING
    async fn on_load(&self, _ctx: &ExtensionContext) -> HookResult {
        Ok(())
    }

    /// Called while moving to UNLOADED
    async fn on_unload(&self, _ctx: &ExtensionContext) -> HookResult {
        Ok(())
    }

    /// Called while ACTIVATING
    async fn on_activate(&self, _ctx: &ExtensionContext) -> HookResult {
        Ok(())
    }

    /// Called while DEACTIVATING
    async fn on_deactivate(&self, _ctx: &ExtensionContext) -> HookResult {
        Ok(())
    }

    /// Called after the live configuration changed
    async fn on_config_change(
        &self,
        _old: &ExtensionConfig,
        _new: &ExtensionConfig,
    ) -> HookResult {
        Ok(())
    }

    /// Whether [`Extension::health_check`] is implemented
    ///
    /// Extensions without a health check are healthy exactly while ACTIVE.
    fn has_health_check(&self) -> bool {
        false
    }

    /// Health check
    async fn health_check(&self) -> std::result::Result<HealthCheckResult, BoxError> {
        Ok(HealthCheckResult::healthy())
    }
}

/// Immutable extension identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMeta {
    /// Unique id
    pub id: String,

    /// Display name
    pub name: String,

    /// Semantic version
    pub version: Version,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<ExtensionDependency>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExtensionMeta {
    /// Create metadata with the given id, name and version
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version,
            description: String::new(),
            dependencies: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a dependency
    pub fn depends_on(mut self, dependency: ExtensionDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Required dependencies only
    pub fn required_dependencies(&self) -> impl Iterator<Item = &ExtensionDependency> {
        self.dependencies.iter().filter(|d| d.required)
    }
}

/// Dependency on another extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDependency {
    /// Id of the extension depended upon
    pub extension_id: String,

    /// Accepted versions (semver requirement)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,

    /// Whether activation must fail without it
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ExtensionDependency {
    /// Create a required dependency
    pub fn required(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            version_range: None,
            required: true,
        }
    }

    /// Create an optional dependency
    pub fn optional(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            version_range: None,
            required: false,
        }
    }

    /// Restrict accepted versions
    pub fn with_version(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    /// Check if a version satisfies this dependency
    ///
    /// A dependency without a range accepts every version; an unparsable range
    /// accepts none.
    pub fn satisfies(&self, version: &Version) -> bool {
        let Some(range) = &self.version_range else {
            return true;
        };
        match VersionReq::parse(range) {
            Ok(req) => req.matches(version),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dependency() {
        let dep = ExtensionDependency::required("storage").with_version("^1.2");
        assert!(dep.required);
        assert_eq!(dep.extension_id, "storage");

        assert!(dep.satisfies(&Version::new(1, 2, 0)));
        assert!(dep.satisfies(&Version::new(1, 9, 3)));
        assert!(!dep.satisfies(&Version::new(1, 1, 0)));
        assert!(!dep.satisfies(&Version::new(2, 0, 0)));

        assert!(ExtensionDependency::optional("cache").satisfies(&Version::new(0, 1, 0)));
        let broken = ExtensionDependency::required("x").with_version("not a range");
        assert!(!broken.satisfies(&Version::new(1, 0, 0)));
    }

    #[test]
    fn test_meta_builder() {
        let meta = ExtensionMeta::new("user-center", "User Center", Version::new(1, 0, 0))
            .description("login and registration")
            .depends_on(ExtensionDependency::required("storage"))
            .depends_on(ExtensionDependency::optional("notification"))
            .tag("auth");

        assert_eq!(meta.required_dependencies().count(), 1);
        assert_eq!(meta.tags, vec!["auth".to_string()]);
    }

    #[test]
    fn test_dependency_deserialize_defaults() {
        let dep: ExtensionDependency =
            serde_json::from_value(serde_json::json!({ "extension_id": "storage" })).unwrap();
        assert!(dep.required);
        assert!(dep.version_range.is_none());
    }
}
