//! Testing utilities for extension and runtime developers
//!
//! [`MockExtension`] is a scriptable extension: every hook can be told to
//! fail or hang, calls are counted, and the health check can be flipped
//! between healthy, unhealthy and erroring at runtime.

use crate::config::ExtensionConfig;
use crate::context::ExtensionContext;
use crate::error::{BoxError, HookResult};
use crate::extension::{Extension, ExtensionDependency, ExtensionMeta};
use crate::health::HealthCheckResult;
use crate::schema::ExtensionCapabilities;
use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Hooks a [`MockExtension`] can be scripted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockHook {
    /// `on_load`
    Load,
    /// `on_unload`
    Unload,
    /// `on_activate`
    Activate,
    /// `on_deactivate`
    Deactivate,
    /// `on_config_change`
    ConfigChange,
    /// `health_check`
    HealthCheck,
}

impl MockHook {
    fn label(&self) -> &'static str {
        match self {
            MockHook::Load => "load",
            MockHook::Unload => "unload",
            MockHook::Activate => "activate",
            MockHook::Deactivate => "deactivate",
            MockHook::ConfigChange => "config-change",
            MockHook::HealthCheck => "health-check",
        }
    }
}

/// Health check behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMode {
    /// Report healthy
    Healthy,
    /// Report unhealthy
    Unhealthy,
    /// Return an error from the check
    Error,
}

/// Shared journal of hook calls across several mocks, as `"<id>:<hook>"`
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default)]
struct MockState {
    failing: HashSet<MockHook>,
    hanging: HashSet<MockHook>,
    calls: HashMap<MockHook, usize>,
    config_changes: Vec<(ExtensionConfig, ExtensionConfig)>,
    health_mode: Option<HealthMode>,
}

/// Scriptable extension for tests
#[derive(Debug, Clone)]
pub struct MockExtension {
    meta: ExtensionMeta,
    extension_type: String,
    capabilities: ExtensionCapabilities,
    state: Arc<Mutex<MockState>>,
    log: Option<CallLog>,
}

impl MockExtension {
    /// Create a mock with version 1.0.0
    pub fn new(id: impl Into<String>, extension_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            meta: ExtensionMeta::new(id.clone(), id, Version::new(1, 0, 0)),
            extension_type: extension_type.into(),
            capabilities: ExtensionCapabilities::default(),
            state: Arc::new(Mutex::new(MockState::default())),
            log: None,
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: Version) -> Self {
        self.meta.version = version;
        self
    }

    /// Declare a dependency
    pub fn with_dependency(mut self, dependency: ExtensionDependency) -> Self {
        self.meta.dependencies.push(dependency);
        self
    }

    /// Declare capabilities
    pub fn with_capabilities(mut self, capabilities: ExtensionCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Enable the health check in the given mode
    pub fn with_health_check(self, mode: HealthMode) -> Self {
        self.state.lock().health_mode = Some(mode);
        self
    }

    /// Journal hook calls into a shared log
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make a hook fail until [`MockExtension::recover`] is called
    pub fn fail_on(&self, hook: MockHook) {
        self.state.lock().failing.insert(hook);
    }

    /// Make a hook never complete
    pub fn hang_on(&self, hook: MockHook) {
        self.state.lock().hanging.insert(hook);
    }

    /// Clear all failures and hangs
    pub fn recover(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.hanging.clear();
    }

    /// Switch the health mode
    pub fn set_health_mode(&self, mode: HealthMode) {
        self.state.lock().health_mode = Some(mode);
    }

    /// Number of times a hook ran
    pub fn calls(&self, hook: MockHook) -> usize {
        self.state.lock().calls.get(&hook).copied().unwrap_or(0)
    }

    /// Recorded `(old, new)` configuration pairs
    pub fn config_changes(&self) -> Vec<(ExtensionConfig, ExtensionConfig)> {
        self.state.lock().config_changes.clone()
    }

    async fn run(&self, hook: MockHook) -> HookResult {
        let (fail, hang) = {
            let mut state = self.state.lock();
            *state.calls.entry(hook).or_default() += 1;
            (state.failing.contains(&hook), state.hanging.contains(&hook))
        };

        if let Some(log) = &self.log {
            log.lock().push(format!("{}:{}", self.meta.id, hook.label()));
        }

        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(format!("{} hook failed", hook.label()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Extension for MockExtension {
    fn meta(&self) -> &ExtensionMeta {
        &self.meta
    }

    fn extension_type(&self) -> &str {
        &self.extension_type
    }

    fn capabilities(&self) -> ExtensionCapabilities {
        self.capabilities.clone()
    }

    async fn on_load(&self, _ctx: &ExtensionContext) -> HookResult {
        self.run(MockHook::Load).await
    }

    async fn on_unload(&self, _ctx: &ExtensionContext) -> HookResult {
        self.run(MockHook::Unload).await
    }

    async fn on_activate(&self, _ctx: &ExtensionContext) -> HookResult {
        self.run(MockHook::Activate).await
    }

    async fn on_deactivate(&self, _ctx: &ExtensionContext) -> HookResult {
        self.run(MockHook::Deactivate).await
    }

    async fn on_config_change(&self, old: &ExtensionConfig, new: &ExtensionConfig) -> HookResult {
        self.state
            .lock()
            .config_changes
            .push((old.clone(), new.clone()));
        self.run(MockHook::ConfigChange).await
    }

    fn has_health_check(&self) -> bool {
        self.state.lock().health_mode.is_some()
    }

    async fn health_check(&self) -> std::result::Result<HealthCheckResult, BoxError> {
        self.run(MockHook::HealthCheck).await?;
        match self.state.lock().health_mode {
            Some(HealthMode::Unhealthy) => Ok(HealthCheckResult::unhealthy("mock reports unhealthy")),
            Some(HealthMode::Error) => Err("mock health check error".into()),
            _ => Ok(HealthCheckResult::healthy()),
        }
    }
}
