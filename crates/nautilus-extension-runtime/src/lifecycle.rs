//! Lifecycle state machine
//!
//! [`LifecycleManager`] is the only component that changes an extension's
//! status. Every public operation takes the extension's operation lock for
//! its whole duration, so at most one lifecycle operation per extension is in
//! flight. Hook failures never escape as errors: they force the extension
//! into ERROR, emit an `error` event and come back as a failed
//! [`OperationResult`].

use async_trait::async_trait;
use nautilus_extension_api::{
    BoxError, ErrorCode, EventBus, Extension, ExtensionContext, ExtensionError, ExtensionStatus,
    HookResult, LifecycleEvent, Result, StatusView,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default timeout applied to each lifecycle hook
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOperation {
    /// UNLOADED/ERROR -> LOADED
    Load,
    /// any -> UNLOADED
    Unload,
    /// -> ACTIVE
    Activate,
    /// ACTIVE -> INACTIVE
    Deactivate,
    /// unload, load, and re-activate if it was active
    Reload,
    /// deactivate then activate
    Restart,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleOperation::Load => "load",
            LifecycleOperation::Unload => "unload",
            LifecycleOperation::Activate => "activate",
            LifecycleOperation::Deactivate => "deactivate",
            LifecycleOperation::Reload => "reload",
            LifecycleOperation::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// Outcome of a lifecycle operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Whether the operation completed
    pub success: bool,

    /// Operation performed
    pub operation: LifecycleOperation,

    /// Extension operated on
    pub extension_id: String,

    /// Status before the operation
    pub previous_status: ExtensionStatus,

    /// Status after the operation
    pub current_status: ExtensionStatus,

    /// Failure, if any
    pub error: Option<ExtensionError>,

    /// Wall time spent
    pub duration: Duration,
}

impl OperationResult {
    /// Duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Error code of the failure, if any
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Lifecycle manager configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Upper bound for each hook; `None` waits forever
    pub operation_timeout: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

/// Ids currently being activated, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationChain {
    ids: Vec<String>,
}

impl ActivationChain {
    /// Empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an id is already being activated
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    /// Chain extended by one id
    pub fn with(&self, id: &str) -> Self {
        let mut ids = self.ids.clone();
        ids.push(id.to_string());
        Self { ids }
    }

    /// Ids in activation order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// Makes sure an extension's dependencies are active before it activates
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Resolve dependencies of `dependent`
    ///
    /// `chain` already ends with `dependent`'s id.
    async fn resolve(&self, dependent: &ManagedExtension, chain: &ActivationChain) -> Result<()>;
}

/// Resolver for extensions managed without a registry
///
/// Fails when any required dependency is declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

#[async_trait]
impl DependencyResolver for NoDependencies {
    async fn resolve(&self, dependent: &ManagedExtension, _chain: &ActivationChain) -> Result<()> {
        match dependent.extension().meta().required_dependencies().next() {
            Some(dep) => Err(ExtensionError::dependency_missing(
                dependent.id(),
                &dep.extension_id,
            )),
            None => Ok(()),
        }
    }
}

/// An extension together with the state the lifecycle manager owns for it
pub struct ManagedExtension {
    id: String,
    extension: Arc<dyn Extension>,
    context: ExtensionContext,
    status: Arc<RwLock<ExtensionStatus>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for ManagedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedExtension")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl ManagedExtension {
    /// Wrap an extension
    ///
    /// The status cell is created here, starting at UNLOADED; `make_context`
    /// receives a read-only view of it.
    pub fn new<F>(extension: Arc<dyn Extension>, make_context: F) -> Self
    where
        F: FnOnce(StatusView) -> ExtensionContext,
    {
        let status = Arc::new(RwLock::new(ExtensionStatus::Unloaded));
        let context = make_context(StatusView::new(status.clone()));

        Self {
            id: extension.meta().id.clone(),
            extension,
            context,
            status,
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Extension id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The extension
    pub fn extension(&self) -> &Arc<dyn Extension> {
        &self.extension
    }

    /// The extension's context
    pub fn context(&self) -> &ExtensionContext {
        &self.context
    }

    /// Current status
    pub fn status(&self) -> ExtensionStatus {
        *self.status.read()
    }

    fn set_status(&self, next: ExtensionStatus) {
        let previous = std::mem::replace(&mut *self.status.write(), next);
        debug!(extension = %self.id, from = %previous, to = %next, "Status changed");
    }
}

enum HookFailure {
    Failed(BoxError),
    TimedOut(Duration),
}

/// Drives extensions through the transition table
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    events: EventBus,
    config: LifecycleConfig,
}

impl LifecycleManager {
    /// Create a lifecycle manager emitting on `events`
    pub fn new(events: EventBus, config: LifecycleConfig) -> Self {
        Self { events, config }
    }

    /// Event bus in use
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Configuration in use
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Load: UNLOADED/ERROR -> LOADING -> LOADED
    pub async fn load(&self, ext: &ManagedExtension) -> OperationResult {
        let _guard = ext.op_lock.lock().await;
        self.run(LifecycleOperation::Load, ext, self.load_inner(ext))
            .await
    }

    /// Unload, deactivating first when ACTIVE
    pub async fn unload(&self, ext: &ManagedExtension) -> OperationResult {
        let _guard = ext.op_lock.lock().await;
        self.run(LifecycleOperation::Unload, ext, self.unload_inner(ext))
            .await
    }

    /// Activate, loading first when needed and resolving dependencies
    pub async fn activate(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
    ) -> OperationResult {
        self.activate_with_chain(ext, resolver, &ActivationChain::new())
            .await
    }

    /// Activate as part of a dependency chain
    ///
    /// Fails fast with `CYCLIC_DEPENDENCY`, without touching the status, when
    /// `ext` is already in `chain`.
    pub async fn activate_with_chain(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
        chain: &ActivationChain,
    ) -> OperationResult {
        if chain.contains(ext.id()) {
            let status = ext.status();
            let cycle = chain.with(ext.id());
            return OperationResult {
                success: false,
                operation: LifecycleOperation::Activate,
                extension_id: ext.id().to_string(),
                previous_status: status,
                current_status: status,
                error: Some(ExtensionError::cyclic_dependency(ext.id(), cycle.ids())),
                duration: Duration::ZERO,
            };
        }

        let _guard = ext.op_lock.lock().await;
        self.run(
            LifecycleOperation::Activate,
            ext,
            self.activate_inner(ext, resolver, chain),
        )
        .await
    }

    /// Activate unless already ACTIVE
    ///
    /// Used for dependencies, where "already active" is success rather than
    /// an invalid transition.
    pub async fn ensure_active(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
        chain: &ActivationChain,
    ) -> OperationResult {
        if chain.contains(ext.id()) {
            return self.activate_with_chain(ext, resolver, chain).await;
        }

        let _guard = ext.op_lock.lock().await;
        self.ensure_active_locked(ext, resolver, chain).await
    }

    /// Like [`ensure_active`](Self::ensure_active), but returns `None` instead
    /// of waiting when another operation holds the extension
    ///
    /// Used for optional dependencies, which may close a cycle with an
    /// activation already in flight on another task.
    pub async fn try_ensure_active(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
        chain: &ActivationChain,
    ) -> Option<OperationResult> {
        if chain.contains(ext.id()) {
            return Some(self.activate_with_chain(ext, resolver, chain).await);
        }

        let _guard = ext.op_lock.try_lock().ok()?;
        Some(self.ensure_active_locked(ext, resolver, chain).await)
    }

    async fn ensure_active_locked(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
        chain: &ActivationChain,
    ) -> OperationResult {
        let inner = async {
            if ext.status().is_active() {
                return Ok(());
            }
            self.activate_inner(ext, resolver, chain).await
        };
        self.run(LifecycleOperation::Activate, ext, inner).await
    }

    /// Deactivate: ACTIVE -> DEACTIVATING -> INACTIVE
    pub async fn deactivate(&self, ext: &ManagedExtension) -> OperationResult {
        let _guard = ext.op_lock.lock().await;
        self.run(LifecycleOperation::Deactivate, ext, self.deactivate_inner(ext))
            .await
    }

    /// Reload: unload, load, and re-activate if it was ACTIVE
    ///
    /// A failure midway leaves the extension where the failing step left it.
    pub async fn reload(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
    ) -> OperationResult {
        let _guard = ext.op_lock.lock().await;
        let inner = async {
            let was_active = ext.status().is_active();
            if ext.status() != ExtensionStatus::Unloaded {
                self.unload_inner(ext).await?;
            }
            self.load_inner(ext).await?;
            if was_active {
                self.activate_inner(ext, resolver, &ActivationChain::new())
                    .await?;
            }
            Ok(())
        };
        self.run(LifecycleOperation::Reload, ext, inner).await
    }

    /// Restart: deactivate (when ACTIVE) then activate
    ///
    /// Does not unload, so load-time resources survive.
    pub async fn restart(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
    ) -> OperationResult {
        let _guard = ext.op_lock.lock().await;
        let inner = async {
            if ext.status().is_active() {
                self.deactivate_inner(ext).await?;
            }
            self.activate_inner(ext, resolver, &ActivationChain::new())
                .await
        };
        self.run(LifecycleOperation::Restart, ext, inner).await
    }

    async fn run<F>(
        &self,
        operation: LifecycleOperation,
        ext: &ManagedExtension,
        inner: F,
    ) -> OperationResult
    where
        F: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let previous_status = ext.status();
        let outcome = inner.await;
        let duration = started.elapsed();
        let current_status = ext.status();

        match &outcome {
            Ok(()) => info!(
                extension = %ext.id(),
                operation = %operation,
                from = %previous_status,
                to = %current_status,
                duration_ms = duration.as_millis() as u64,
                "Lifecycle operation completed"
            ),
            Err(e) => warn!(
                extension = %ext.id(),
                operation = %operation,
                code = %e.code,
                error = %e,
                duration_ms = duration.as_millis() as u64,
                "Lifecycle operation failed"
            ),
        }

        OperationResult {
            success: outcome.is_ok(),
            operation,
            extension_id: ext.id().to_string(),
            previous_status,
            current_status,
            error: outcome.err(),
            duration,
        }
    }

    async fn load_inner(&self, ext: &ManagedExtension) -> Result<()> {
        self.check_transition(ext, ExtensionStatus::Loading)?;

        self.emit(LifecycleEvent::BeforeLoad, ext);
        ext.set_status(ExtensionStatus::Loading);

        let hook = ext.extension().on_load(ext.context());
        if let Err(failure) = self.run_hook(hook).await {
            return Err(self.fail(ext, ErrorCode::LoadFailed, "on_load", failure));
        }

        ext.set_status(ExtensionStatus::Loaded);
        self.emit(LifecycleEvent::AfterLoad, ext);
        Ok(())
    }

    async fn unload_inner(&self, ext: &ManagedExtension) -> Result<()> {
        if ext.status().is_active() {
            self.deactivate_inner(ext).await?;
        }
        self.check_transition(ext, ExtensionStatus::Unloaded)?;

        self.emit(LifecycleEvent::BeforeUnload, ext);

        let hook = ext.extension().on_unload(ext.context());
        if let Err(failure) = self.run_hook(hook).await {
            return Err(self.fail(ext, ErrorCode::UnloadFailed, "on_unload", failure));
        }

        ext.set_status(ExtensionStatus::Unloaded);
        self.emit(LifecycleEvent::AfterUnload, ext);
        Ok(())
    }

    async fn activate_inner(
        &self,
        ext: &ManagedExtension,
        resolver: &dyn DependencyResolver,
        chain: &ActivationChain,
    ) -> Result<()> {
        if matches!(
            ext.status(),
            ExtensionStatus::Unloaded | ExtensionStatus::Error
        ) {
            self.load_inner(ext).await?;
        }
        self.check_transition(ext, ExtensionStatus::Activating)?;

        self.emit(LifecycleEvent::BeforeActivate, ext);
        ext.set_status(ExtensionStatus::Activating);

        let chain = chain.with(ext.id());
        if let Err(err) = resolver.resolve(ext, &chain).await {
            return Err(self.force_error(ext, err));
        }

        let hook = ext.extension().on_activate(ext.context());
        if let Err(failure) = self.run_hook(hook).await {
            return Err(self.fail(ext, ErrorCode::ActivateFailed, "on_activate", failure));
        }

        ext.set_status(ExtensionStatus::Active);
        self.emit(LifecycleEvent::AfterActivate, ext);
        Ok(())
    }

    async fn deactivate_inner(&self, ext: &ManagedExtension) -> Result<()> {
        self.check_transition(ext, ExtensionStatus::Deactivating)?;

        self.emit(LifecycleEvent::BeforeDeactivate, ext);
        ext.set_status(ExtensionStatus::Deactivating);

        let hook = ext.extension().on_deactivate(ext.context());
        if let Err(failure) = self.run_hook(hook).await {
            return Err(self.fail(ext, ErrorCode::DeactivateFailed, "on_deactivate", failure));
        }

        ext.set_status(ExtensionStatus::Inactive);
        self.emit(LifecycleEvent::AfterDeactivate, ext);
        Ok(())
    }

    fn check_transition(&self, ext: &ManagedExtension, next: ExtensionStatus) -> Result<()> {
        let current = ext.status();
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(ExtensionError::invalid_transition(ext.id(), current, next))
        }
    }

    async fn run_hook<F>(&self, hook: F) -> std::result::Result<(), HookFailure>
    where
        F: Future<Output = HookResult>,
    {
        match self.config.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, hook).await {
                Ok(result) => result.map_err(HookFailure::Failed),
                Err(_) => Err(HookFailure::TimedOut(limit)),
            },
            None => hook.await.map_err(HookFailure::Failed),
        }
    }

    fn fail(
        &self,
        ext: &ManagedExtension,
        code: ErrorCode,
        hook: &str,
        failure: HookFailure,
    ) -> ExtensionError {
        let err = match failure {
            HookFailure::Failed(cause) => {
                ExtensionError::new(ext.id(), code, format!("{hook} failed: {cause}"))
                    .with_source(cause)
            }
            HookFailure::TimedOut(limit) => ExtensionError::timeout(ext.id(), hook, limit),
        };
        self.force_error(ext, err)
    }

    fn force_error(&self, ext: &ManagedExtension, err: ExtensionError) -> ExtensionError {
        error!(extension = %ext.id(), code = %err.code, error = %err, "Extension entered ERROR");
        ext.set_status(ExtensionStatus::Error);
        self.events.emit_lifecycle(
            LifecycleEvent::Error,
            ext.id(),
            json!({ "error": error_payload(&err) }),
        );
        err
    }

    fn emit(&self, kind: LifecycleEvent, ext: &ManagedExtension) {
        self.events.emit_lifecycle(kind, ext.id(), Value::Null);
    }
}

/// JSON form of an error, as carried in event payloads
pub fn error_payload(err: &ExtensionError) -> Value {
    json!({
        "extensionId": err.extension_id,
        "code": err.code,
        "message": err.message,
        "cause": err.source.as_ref().map(|s| s.to_string()),
    })
}
