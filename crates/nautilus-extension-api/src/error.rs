//! Extension error types

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Boxed error returned by extension hooks and health checks
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for extension hooks
pub type HookResult = std::result::Result<(), BoxError>;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The id is already present in the registry
    AlreadyRegistered,
    /// The referenced id is unknown
    ExtensionNotFound,
    /// The requested transition is not in the state table
    InvalidStateTransition,
    /// A required dependency is not registered
    DependencyMissing,
    /// A dependency version does not satisfy the declared range
    VersionIncompatible,
    /// A chain of required dependencies revisits an extension
    CyclicDependency,
    /// `on_load` failed
    LoadFailed,
    /// `on_unload` failed
    UnloadFailed,
    /// `on_activate` failed
    ActivateFailed,
    /// `on_deactivate` failed
    DeactivateFailed,
    /// A hook did not finish within the operation timeout
    Timeout,
    /// The supplied configuration did not pass validation
    ConfigInvalid,
}

impl ErrorCode {
    /// Stable string form, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorCode::ExtensionNotFound => "EXTENSION_NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::DependencyMissing => "DEPENDENCY_MISSING",
            ErrorCode::VersionIncompatible => "VERSION_INCOMPATIBLE",
            ErrorCode::CyclicDependency => "CYCLIC_DEPENDENCY",
            ErrorCode::LoadFailed => "LOAD_FAILED",
            ErrorCode::UnloadFailed => "UNLOAD_FAILED",
            ErrorCode::ActivateFailed => "ACTIVATE_FAILED",
            ErrorCode::DeactivateFailed => "DEACTIVATE_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the extension runtime
///
/// Every error names the extension it concerns and carries a machine-readable
/// [`ErrorCode`]. The optional cause is reference counted so that errors can be
/// cloned into operation results and event payloads.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {extension_id}: {message}")]
pub struct ExtensionError {
    /// Extension the error concerns
    pub extension_id: String,

    /// Machine-readable code
    pub code: ErrorCode,

    /// Human readable message
    pub message: String,

    /// Wrapped cause
    #[source]
    pub source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl ExtensionError {
    /// Create a new error
    pub fn new(extension_id: impl Into<String>, code: ErrorCode, message: impl fmt::Display) -> Self {
        Self {
            extension_id: extension_id.into(),
            code,
            message: message.to_string(),
            source: None,
        }
    }

    /// Attach a cause
    pub fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(Arc::from(source));
        self
    }

    /// Create an already registered error
    pub fn already_registered(id: impl Into<String>) -> Self {
        let id = id.into();
        let message = format!("extension {id} is already registered");
        Self::new(id, ErrorCode::AlreadyRegistered, message)
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        let message = format!("extension {id} is not registered");
        Self::new(id, ErrorCode::ExtensionNotFound, message)
    }

    /// Create an invalid state transition error
    pub fn invalid_transition(
        id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self::new(
            id,
            ErrorCode::InvalidStateTransition,
            format!("invalid state transition from {from} to {to}"),
        )
    }

    /// Create a dependency missing error
    pub fn dependency_missing(id: impl Into<String>, dependency: &str) -> Self {
        Self::new(
            id,
            ErrorCode::DependencyMissing,
            format!("required dependency {dependency} is not registered"),
        )
    }

    /// Create a version incompatible error
    pub fn version_incompatible(
        id: impl Into<String>,
        dependency: &str,
        found: &str,
        required: &str,
    ) -> Self {
        Self::new(
            id,
            ErrorCode::VersionIncompatible,
            format!("dependency {dependency} has version {found}, required {required}"),
        )
    }

    /// Create a cyclic dependency error from the activation chain
    pub fn cyclic_dependency(id: impl Into<String>, chain: &[String]) -> Self {
        Self::new(
            id,
            ErrorCode::CyclicDependency,
            format!("dependency cycle detected: {}", chain.join(" -> ")),
        )
    }

    /// Create a timeout error
    pub fn timeout(id: impl Into<String>, hook: &str, after: std::time::Duration) -> Self {
        Self::new(
            id,
            ErrorCode::Timeout,
            format!("{hook} did not complete within {}ms", after.as_millis()),
        )
    }

    /// Check the error code
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ExtensionError::already_registered("cache");
        assert!(err.is(ErrorCode::AlreadyRegistered));
        assert_eq!(err.extension_id, "cache");

        let err = ExtensionError::not_found("cache");
        assert!(err.is(ErrorCode::ExtensionNotFound));
    }

    #[test]
    fn test_error_display() {
        let err = ExtensionError::invalid_transition("cache", "ACTIVE", "ACTIVATING");
        assert_eq!(
            err.to_string(),
            "[INVALID_STATE_TRANSITION] cache: invalid state transition from ACTIVE to ACTIVATING"
        );
    }

    #[test]
    fn test_error_source() {
        let cause: BoxError = "disk full".into();
        let err = ExtensionError::new("storage", ErrorCode::LoadFailed, "load failed")
            .with_source(cause);

        let source = StdError::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));

        let cloned = err.clone();
        assert!(cloned.source.is_some());
    }

    #[test]
    fn test_cycle_message() {
        let chain = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let err = ExtensionError::cyclic_dependency("a", &chain);
        assert!(err.message.contains("a -> b -> a"));
        assert_eq!(serde_json::to_value(err.code).unwrap(), "CYCLIC_DEPENDENCY");
    }
}
