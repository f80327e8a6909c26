//! Extension registry
//!
//! The registry owns every registered extension together with its live
//! configuration, its context and its status cell. Lifecycle work is handed to
//! the [`LifecycleManager`]; the registry adds lookup, configuration merging,
//! dependency resolution and ordered shutdown on top.

use crate::host::{HostConfigSource, StaticHostConfig};
use crate::lifecycle::{
    ActivationChain, DependencyResolver, LifecycleConfig, LifecycleManager, ManagedExtension,
    OperationResult, DEFAULT_OPERATION_TIMEOUT,
};
use crate::validator::{merge_configs, ConfigValidator, ValidationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nautilus_extension_api::{
    ErrorCode, EventBus, Extension, ExtensionConfig, ExtensionConfigPatch, ExtensionContext,
    ExtensionDirectory, ExtensionError, ExtensionMeta, ExtensionStatus, LifecycleEvent, Result,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A registered extension and the state the registry keeps for it
pub struct ExtensionRegistration {
    managed: ManagedExtension,
    extension_type: String,
    config: Arc<RwLock<ExtensionConfig>>,
    registered_at: DateTime<Utc>,
    updated_at: RwLock<DateTime<Utc>>,
    sequence: u64,
}

impl fmt::Debug for ExtensionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistration")
            .field("id", &self.id())
            .field("extension_type", &self.extension_type)
            .field("status", &self.status())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl ExtensionRegistration {
    /// Extension id
    pub fn id(&self) -> &str {
        self.managed.id()
    }

    /// The extension
    pub fn extension(&self) -> &Arc<dyn Extension> {
        self.managed.extension()
    }

    /// Declared type
    pub fn extension_type(&self) -> &str {
        &self.extension_type
    }

    /// Current status
    pub fn status(&self) -> ExtensionStatus {
        self.managed.status()
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> ExtensionConfig {
        self.config.read().clone()
    }

    /// Context handed to the extension
    pub fn context(&self) -> &ExtensionContext {
        self.managed.context()
    }

    /// When the extension was registered
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// When the configuration last changed
    pub fn updated_at(&self) -> DateTime<Utc> {
        *self.updated_at.read()
    }

    /// Registration order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn priority(&self) -> i32 {
        self.config.read().priority
    }

    /// Snapshot for listing
    pub fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            meta: self.extension().meta().clone(),
            extension_type: self.extension_type.clone(),
            status: self.status(),
            config: self.config(),
            registered_at: self.registered_at,
            updated_at: self.updated_at(),
        }
    }
}

/// Serializable view of a registration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    /// Identity
    pub meta: ExtensionMeta,

    /// Declared type
    #[serde(rename = "type")]
    pub extension_type: String,

    /// Current status
    pub status: ExtensionStatus,

    /// Live configuration
    pub config: ExtensionConfig,

    /// Registration time
    pub registered_at: DateTime<Utc>,

    /// Last configuration change
    pub updated_at: DateTime<Utc>,
}

/// Registry statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    /// Total number of registered extensions
    pub total: usize,

    /// Count per status
    pub by_status: BTreeMap<String, usize>,

    /// Count per declared type
    pub by_type: BTreeMap<String, usize>,
}

impl RegistryStats {
    /// Number of extensions in a status
    pub fn count(&self, status: ExtensionStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// Builder for [`ExtensionRegistry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    events: Option<EventBus>,
    host: Option<Arc<dyn HostConfigSource>>,
    lifecycle: Option<LifecycleConfig>,
    strict_validation: Option<bool>,
}

impl RegistryBuilder {
    /// Share an existing event bus
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Host configuration source
    pub fn host_config(mut self, host: Arc<dyn HostConfigSource>) -> Self {
        self.host = Some(host);
        self
    }

    /// Override the lifecycle configuration read from the host
    pub fn lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle = Some(config);
        self
    }

    /// Override the hook timeout read from the host
    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lifecycle = Some(LifecycleConfig {
            operation_timeout: timeout,
        });
        self
    }

    /// Reject registrations whose configuration fails validation
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = Some(strict);
        self
    }

    /// Build the registry
    pub fn build(self) -> Arc<ExtensionRegistry> {
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(StaticHostConfig::new()) as Arc<dyn HostConfigSource>);

        let lifecycle = self.lifecycle.unwrap_or_else(|| {
            let operation_timeout = match host.get_u64("runtime.operation_timeout_ms") {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => Some(DEFAULT_OPERATION_TIMEOUT),
            };
            LifecycleConfig { operation_timeout }
        });

        let strict_validation = self
            .strict_validation
            .or_else(|| host.get_bool("runtime.strict_validation"))
            .unwrap_or(false);

        let events = self.events.unwrap_or_default();

        Arc::new_cyclic(|self_ref| ExtensionRegistry {
            self_ref: self_ref.clone(),
            registrations: DashMap::new(),
            types: DashMap::new(),
            lifecycle: LifecycleManager::new(events.clone(), lifecycle),
            events,
            host,
            validator: ConfigValidator::new(),
            strict_validation,
            sequence: AtomicU64::new(0),
        })
    }
}

/// Registry of extensions
///
/// Always handled through an `Arc`; contexts keep a weak reference back to it
/// for lookups.
pub struct ExtensionRegistry {
    self_ref: Weak<ExtensionRegistry>,
    registrations: DashMap<String, Arc<ExtensionRegistration>>,
    types: DashMap<String, HashSet<String>>,
    lifecycle: LifecycleManager,
    events: EventBus,
    host: Arc<dyn HostConfigSource>,
    validator: ConfigValidator,
    strict_validation: bool,
    sequence: AtomicU64,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.registrations.len())
            .field("strict_validation", &self.strict_validation)
            .finish()
    }
}

impl ExtensionRegistry {
    /// Registry with default settings and its own event bus
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Event bus shared with every context
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Host configuration source
    pub fn host_config(&self) -> &Arc<dyn HostConfigSource> {
        &self.host
    }

    /// Lifecycle manager in use
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Register an extension
    ///
    /// The configuration is built from the defaults, then the host-supplied
    /// blob for the id, then `config`. Enabled extensions are loaded right
    /// away and the load result is returned; activation is left to the
    /// caller.
    pub async fn register(
        &self,
        extension: Arc<dyn Extension>,
        config: Option<ExtensionConfigPatch>,
    ) -> Result<Option<OperationResult>> {
        let id = extension.meta().id.clone();
        if self.registrations.contains_key(&id) {
            return Err(ExtensionError::already_registered(&id));
        }

        let mut merged = ExtensionConfig::default();
        if let Some(host) = self.host.extension_config(&id) {
            merged = merge_configs(&merged, &host);
        }
        if let Some(patch) = &config {
            merged = merge_configs(&merged, patch);
        }

        let validation = self.validator.validate(&extension.capabilities(), &merged);
        let merged = self.accept_validation(&id, validation)?;
        let enabled = merged.enabled;

        let extension_type = extension.extension_type().to_string();
        let config_cell = Arc::new(RwLock::new(merged));
        let directory: Weak<dyn ExtensionDirectory> = self.self_ref.clone();
        let events = self.events.clone();
        let context_config = config_cell.clone();
        let context_type = extension_type.clone();
        let context_id = id.clone();

        let managed = ManagedExtension::new(extension, move |status| {
            ExtensionContext::new(
                context_id,
                context_type,
                context_config,
                status,
                directory,
                events,
            )
        });

        let now = Utc::now();
        let registration = Arc::new(ExtensionRegistration {
            managed,
            extension_type: extension_type.clone(),
            config: config_cell,
            registered_at: now,
            updated_at: RwLock::new(now),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        });

        match self.registrations.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ExtensionError::already_registered(&id));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(registration.clone());
            }
        }
        self.types
            .entry(extension_type.clone())
            .or_default()
            .insert(id.clone());

        info!(extension = %id, kind = %extension_type, enabled, "Extension registered");

        if !enabled {
            return Ok(None);
        }
        Ok(Some(self.lifecycle.load(&registration.managed).await))
    }

    /// Unregister an extension, deactivating and unloading it as needed
    ///
    /// Unknown ids are ignored. Returns whether something was removed.
    pub async fn unregister(&self, id: &str) -> bool {
        let Some(registration) = self.registration(id) else {
            debug!(extension = %id, "Unregister of unknown extension ignored");
            return false;
        };

        if registration.status() != ExtensionStatus::Unloaded {
            let result = self.lifecycle.unload(&registration.managed).await;
            if let Some(err) = result.error {
                warn!(extension = %id, error = %err, "Unload during unregister failed");
            }
        }

        let removed = self.registrations.remove(id).is_some();
        let mut empty = false;
        if let Some(mut ids) = self.types.get_mut(registration.extension_type()) {
            ids.remove(id);
            empty = ids.is_empty();
        }
        if empty {
            self.types
                .remove_if(registration.extension_type(), |_, ids| ids.is_empty());
        }

        info!(extension = %id, "Extension unregistered");
        removed
    }

    /// Load an extension
    pub async fn load(&self, id: &str) -> Result<OperationResult> {
        let registration = self.require(id)?;
        Ok(self.lifecycle.load(&registration.managed).await)
    }

    /// Unload an extension; `None` for unknown ids
    pub async fn unload(&self, id: &str) -> Option<OperationResult> {
        let registration = self.registration(id)?;
        Some(self.lifecycle.unload(&registration.managed).await)
    }

    /// Activate an extension and, first, its dependencies
    ///
    /// A missing, incompatible or cyclic dependency is returned as an error
    /// (the extension is left in ERROR); hook failures come back as a failed
    /// result.
    pub async fn activate(&self, id: &str) -> Result<OperationResult> {
        let registration = self.require(id)?;
        let result = self.lifecycle.activate(&registration.managed, self).await;

        match &result.error {
            Some(err) if is_dependency_error(err.code) => Err(err.clone()),
            _ => Ok(result),
        }
    }

    /// Deactivate an extension; `None` for unknown ids
    pub async fn deactivate(&self, id: &str) -> Option<OperationResult> {
        let registration = self.registration(id)?;
        Some(self.lifecycle.deactivate(&registration.managed).await)
    }

    /// Reload an extension
    pub async fn reload(&self, id: &str) -> Result<OperationResult> {
        let registration = self.require(id)?;
        Ok(self.lifecycle.reload(&registration.managed, self).await)
    }

    /// Restart an extension
    pub async fn restart(&self, id: &str) -> Result<OperationResult> {
        let registration = self.require(id)?;
        Ok(self.lifecycle.restart(&registration.managed, self).await)
    }

    /// Activate every enabled extension that is not yet active
    ///
    /// Extensions are taken in ascending priority, then registration order.
    /// Dependency failures are reported in the results, not returned.
    pub async fn activate_all(&self) -> Vec<OperationResult> {
        let mut pending: Vec<_> = self
            .registrations()
            .into_iter()
            .filter(|r| r.config.read().enabled)
            .collect();
        pending.sort_by_key(|r| (r.priority(), r.sequence));

        let mut results = Vec::with_capacity(pending.len());
        for registration in pending {
            // May have come up as someone else's dependency.
            if registration.status().is_active() {
                continue;
            }
            results.push(self.lifecycle.activate(&registration.managed, self).await);
        }
        results
    }

    /// Look up an extension
    pub fn get(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.registrations
            .get(id)
            .map(|r| r.extension().clone())
    }

    /// Look up a registration
    pub fn registration(&self, id: &str) -> Option<Arc<ExtensionRegistration>> {
        self.registrations.get(id).map(|r| r.value().clone())
    }

    /// All registrations in registration order
    pub fn registrations(&self) -> Vec<Arc<ExtensionRegistration>> {
        let mut all: Vec<_> = self
            .registrations
            .iter()
            .map(|r| r.value().clone())
            .collect();
        all.sort_by_key(|r| r.sequence);
        all
    }

    /// Current status of an extension
    pub fn status(&self, id: &str) -> Option<ExtensionStatus> {
        self.registrations.get(id).map(|r| r.status())
    }

    /// Live configuration of an extension
    pub fn config(&self, id: &str) -> Option<ExtensionConfig> {
        self.registrations.get(id).map(|r| r.config())
    }

    /// Extensions of a type, in registration order
    pub fn get_by_type(&self, extension_type: &str) -> Vec<Arc<dyn Extension>> {
        self.registrations_of_type(extension_type)
            .iter()
            .map(|r| r.extension().clone())
            .collect()
    }

    /// All ACTIVE extensions, in registration order
    pub fn get_active(&self) -> Vec<Arc<dyn Extension>> {
        self.registrations()
            .iter()
            .filter(|r| r.status().is_active())
            .map(|r| r.extension().clone())
            .collect()
    }

    /// ACTIVE extensions of a type, ascending by priority
    ///
    /// Equal priorities keep registration order.
    pub fn get_active_by_type(&self, extension_type: &str) -> Vec<Arc<dyn Extension>> {
        let mut active: Vec<_> = self
            .registrations_of_type(extension_type)
            .into_iter()
            .filter(|r| r.status().is_active())
            .collect();
        active.sort_by_key(|r| (r.priority(), r.sequence));
        active.iter().map(|r| r.extension().clone()).collect()
    }

    /// Preferred ACTIVE extension of a type
    pub fn get_primary(&self, extension_type: &str) -> Option<Arc<dyn Extension>> {
        self.get_active_by_type(extension_type).into_iter().next()
    }

    /// Snapshots of every registration, in registration order
    pub fn list(&self) -> Vec<ExtensionInfo> {
        self.registrations().iter().map(|r| r.info()).collect()
    }

    /// Counts per status and type
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for registration in self.registrations.iter() {
            stats.total += 1;
            *stats
                .by_status
                .entry(registration.status().as_str().to_string())
                .or_default() += 1;
            *stats
                .by_type
                .entry(registration.extension_type.clone())
                .or_default() += 1;
        }
        stats
    }

    /// Number of registered extensions
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Merge a partial configuration into an extension's live configuration
    ///
    /// The extension is told through `on_config_change`; a failure there is
    /// logged but does not undo the change.
    pub async fn update_config(
        &self,
        id: &str,
        patch: ExtensionConfigPatch,
    ) -> Result<ExtensionConfig> {
        let registration = self.require(id)?;

        let old = registration.config();
        let merged = merge_configs(&old, &patch);
        let validation = self
            .validator
            .validate(&registration.extension().capabilities(), &merged);
        let new = self.accept_validation(id, validation)?;

        *registration.config.write() = new.clone();
        *registration.updated_at.write() = Utc::now();

        if let Err(e) = registration
            .extension()
            .on_config_change(&old, &new)
            .await
        {
            warn!(extension = %id, error = %e, "on_config_change failed");
        }

        self.events.emit_lifecycle(
            LifecycleEvent::ConfigChanged,
            id,
            json!({ "oldConfig": old, "newConfig": new }),
        );
        info!(extension = %id, "Extension configuration updated");

        Ok(new)
    }

    /// Deactivate then unload everything, newest registration first
    ///
    /// Per-extension failures are logged and do not stop the shutdown.
    pub async fn shutdown(&self) {
        let mut all = self.registrations();
        all.reverse();

        info!(extensions = all.len(), "Shutting down extensions");

        for registration in all.iter().filter(|r| r.status().is_active()) {
            let result = self.lifecycle.deactivate(&registration.managed).await;
            if let Some(err) = result.error {
                warn!(extension = %registration.id(), error = %err, "Deactivate during shutdown failed");
            }
        }

        for registration in all
            .iter()
            .filter(|r| r.status() != ExtensionStatus::Unloaded)
        {
            let result = self.lifecycle.unload(&registration.managed).await;
            if let Some(err) = result.error {
                warn!(extension = %registration.id(), error = %err, "Unload during shutdown failed");
            }
        }

        info!("Extension shutdown complete");
    }

    fn require(&self, id: &str) -> Result<Arc<ExtensionRegistration>> {
        self.registration(id)
            .ok_or_else(|| ExtensionError::not_found(id))
    }

    fn registrations_of_type(&self, extension_type: &str) -> Vec<Arc<ExtensionRegistration>> {
        let ids: Vec<String> = self
            .types
            .get(extension_type)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut found: Vec<_> = ids.iter().filter_map(|id| self.registration(id)).collect();
        found.sort_by_key(|r| r.sequence);
        found
    }

    fn accept_validation(&self, id: &str, validation: ValidationResult) -> Result<ExtensionConfig> {
        for warning in &validation.warnings {
            debug!(extension = %id, warning = %warning, "Configuration warning");
        }

        if !validation.valid {
            let summary = validation.error_summary();
            if self.strict_validation {
                return Err(ExtensionError::new(
                    id,
                    ErrorCode::ConfigInvalid,
                    format!("invalid configuration: {summary}"),
                ));
            }
            warn!(extension = %id, errors = %summary, "Configuration is invalid, continuing with defaults applied");
        }

        Ok(validation.processed_config)
    }
}

impl ExtensionRegistry {
    /// First cycle of registered required dependencies reachable from `start`
    fn required_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut done = HashSet::new();
        self.walk_required(start, &mut path, &mut done)
    }

    fn walk_required(
        &self,
        id: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|p| p == id) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if done.contains(id) {
            return None;
        }
        let registration = self.registration(id)?;

        path.push(id.to_string());
        for dep in registration.extension().meta().required_dependencies() {
            if let Some(cycle) = self.walk_required(&dep.extension_id, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(id.to_string());
        None
    }
}

fn is_dependency_error(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::DependencyMissing | ErrorCode::VersionIncompatible | ErrorCode::CyclicDependency
    )
}

impl ExtensionDirectory for ExtensionRegistry {
    fn extension(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.get(id)
    }

    fn extensions_by_type(&self, extension_type: &str) -> Vec<Arc<dyn Extension>> {
        self.get_by_type(extension_type)
    }

    fn status_of(&self, id: &str) -> Option<ExtensionStatus> {
        self.status(id)
    }
}

#[async_trait]
impl DependencyResolver for ExtensionRegistry {
    async fn resolve(&self, dependent: &ManagedExtension, chain: &ActivationChain) -> Result<()> {
        let id = dependent.id();

        // Checked before any dependency lock is taken, so concurrent
        // activations from both ends of a cycle fail instead of waiting
        if let Some(cycle) = self.required_cycle(id) {
            return Err(ExtensionError::cyclic_dependency(id, &cycle));
        }

        for dep in &dependent.extension().meta().dependencies {
            let dep_id = dep.extension_id.as_str();

            let Some(target) = self.registration(dep_id) else {
                if dep.required {
                    return Err(ExtensionError::dependency_missing(id, dep_id));
                }
                debug!(extension = %id, dependency = %dep_id, "Optional dependency not registered");
                continue;
            };

            let version = &target.extension().meta().version;
            if !dep.satisfies(version) {
                let range = dep.version_range.as_deref().unwrap_or("*");
                if dep.required {
                    return Err(ExtensionError::version_incompatible(
                        id,
                        dep_id,
                        &version.to_string(),
                        range,
                    ));
                }
                warn!(
                    extension = %id,
                    dependency = %dep_id,
                    found = %version,
                    required = %range,
                    "Optional dependency version not satisfied, ignoring"
                );
                continue;
            }

            if target.status().is_active() {
                continue;
            }

            if chain.contains(dep_id) {
                let cycle = chain.with(dep_id);
                if dep.required {
                    return Err(ExtensionError::cyclic_dependency(id, cycle.ids()));
                }
                warn!(extension = %id, dependency = %dep_id, "Optional dependency cycle, ignoring");
                continue;
            }

            debug!(extension = %id, dependency = %dep_id, "Activating dependency");
            let result = if dep.required {
                self.lifecycle
                    .ensure_active(&target.managed, self, chain)
                    .await
            } else {
                let attempt = self
                    .lifecycle
                    .try_ensure_active(&target.managed, self, chain)
                    .await;
                let Some(result) = attempt else {
                    debug!(extension = %id, dependency = %dep_id, "Optional dependency busy, skipping");
                    continue;
                };
                result
            };

            if let Some(err) = result.error {
                if !dep.required {
                    warn!(extension = %id, dependency = %dep_id, error = %err, "Optional dependency failed to activate");
                    continue;
                }

                let code = if is_dependency_error(err.code) {
                    err.code
                } else {
                    ErrorCode::ActivateFailed
                };
                let message = format!("dependency '{dep_id}' failed to activate: {}", err.message);
                return Err(ExtensionError::new(id, code, message).with_source(Box::new(err)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_extension_api::testing::{MockExtension, MockHook};
    use nautilus_extension_api::{ExtensionCapabilities, FieldSchema};

    fn mock(id: &str, kind: &str) -> (MockExtension, Arc<dyn Extension>) {
        let mock = MockExtension::new(id, kind);
        let ext: Arc<dyn Extension> = Arc::new(mock.clone());
        (mock, ext)
    }

    #[tokio::test]
    async fn test_register_loads_enabled() {
        let registry = ExtensionRegistry::new();
        let (mock, ext) = mock("cache", "cache");

        let result = registry.register(ext, None).await.unwrap();
        let result = result.unwrap();
        assert!(result.success);
        assert_eq!(registry.status("cache"), Some(ExtensionStatus::Loaded));
        assert_eq!(mock.calls(MockHook::Activate), 0);
    }

    #[tokio::test]
    async fn test_register_disabled_stays_unloaded() {
        let registry = ExtensionRegistry::new();
        let (_, ext) = mock("cache", "cache");

        let result = registry
            .register(ext, Some(ExtensionConfigPatch::new().enabled(false)))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(registry.status("cache"), Some(ExtensionStatus::Unloaded));
    }

    #[tokio::test]
    async fn test_config_layering() {
        let host = StaticHostConfig::new().extension(
            "cache",
            ExtensionConfigPatch::new().priority(10).setting("ttl", 60),
        );
        let registry = ExtensionRegistry::builder()
            .host_config(Arc::new(host))
            .build();
        let (_, ext) = mock("cache", "cache");

        registry
            .register(ext, Some(ExtensionConfigPatch::new().setting("ttl", 120)))
            .await
            .unwrap();

        let config = registry.config("cache").unwrap();
        assert_eq!(config.priority, 10);
        assert_eq!(config.setting("ttl"), Some(&json!(120)));
    }

    #[tokio::test]
    async fn test_strict_validation_rejects() {
        let registry = ExtensionRegistry::builder().strict_validation(true).build();
        let caps = ExtensionCapabilities::new().field("url", FieldSchema::string().required());
        let ext: Arc<dyn Extension> =
            Arc::new(MockExtension::new("storage", "storage").with_capabilities(caps));

        let err = registry.register(ext, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lenient_validation_applies_defaults() {
        let registry = ExtensionRegistry::new();
        let caps = ExtensionCapabilities::new()
            .field("max_entries", FieldSchema::number().default_value(20));
        let ext: Arc<dyn Extension> =
            Arc::new(MockExtension::new("cache", "cache").with_capabilities(caps));

        registry.register(ext, None).await.unwrap();
        let config = registry.config("cache").unwrap();
        assert_eq!(config.setting("max_entries"), Some(&json!(20)));
    }

    #[tokio::test]
    async fn test_stats_and_list() {
        let registry = ExtensionRegistry::new();
        let (_, a) = mock("a", "cache");
        let (_, b) = mock("b", "storage");
        registry.register(a, None).await.unwrap();
        registry.register(b, None).await.unwrap();
        registry.activate("a").await.unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(ExtensionStatus::Active), 1);
        assert_eq!(stats.count(ExtensionStatus::Loaded), 1);
        assert_eq!(stats.by_type.get("cache"), Some(&1));

        let ids: Vec<_> = registry.list().into_iter().map(|i| i.meta.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_context_sees_registry() {
        let registry = ExtensionRegistry::new();
        let (_, a) = mock("a", "cache");
        let (_, b) = mock("b", "cache");
        registry.register(a, None).await.unwrap();
        registry.register(b, None).await.unwrap();

        let ctx = registry.registration("a").unwrap().context().clone();
        assert!(ctx.get_extension("b").is_some());
        assert_eq!(ctx.get_extensions_by_type("cache").len(), 2);
        assert_eq!(ctx.status_of("b"), Some(ExtensionStatus::Loaded));

        drop(registry);
        assert!(ctx.get_extension("b").is_none());
    }
}
