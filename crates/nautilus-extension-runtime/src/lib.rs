//! # Nautilus Extension Runtime
//!
//! Registration, lifecycle management and configuration validation for
//! Nautilus extensions.
//!
//! ## Features
//!
//! - **Extension Registry**: registration, lookup by id and type, priority
//!   ordering, dependency resolution with cycle detection, ordered shutdown
//! - **Lifecycle Management**: load, activate, deactivate, unload, reload and
//!   restart over a fixed transition table, with hook timeouts and a
//!   per-extension operation lock
//! - **Config Validation**: schema-driven checks with defaults applied
//!
//! ## Example
//!
//! ```rust,no_run
//! use nautilus_extension_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(cache: Arc<dyn Extension>) -> Result<()> {
//! let registry = ExtensionRegistry::new();
//!
//! // Enabled extensions are loaded on registration
//! registry.register(cache, None).await?;
//! registry.activate("memory-cache").await?;
//!
//! let primary = registry.get_primary("cache");
//! assert!(primary.is_some());
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod host;
pub mod lifecycle;
pub mod registry;
pub mod validator;

pub use host::{HostConfigSource, StaticHostConfig};
pub use lifecycle::{
    ActivationChain, DependencyResolver, LifecycleConfig, LifecycleManager, LifecycleOperation,
    ManagedExtension, NoDependencies, OperationResult, DEFAULT_OPERATION_TIMEOUT,
};
pub use registry::{
    ExtensionInfo, ExtensionRegistration, ExtensionRegistry, RegistryBuilder, RegistryStats,
};
pub use validator::{
    merge_configs, ConfigValidator, ValidationErrorKind, ValidationIssue, ValidationResult,
};

// Re-export extension API types for convenience
pub use nautilus_extension_api::{
    ErrorCode, Event, EventBus, Extension, ExtensionConfig, ExtensionConfigPatch,
    ExtensionContext, ExtensionError, ExtensionStatus, LifecycleEvent, Result,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::host::{HostConfigSource, StaticHostConfig};
    pub use crate::lifecycle::{LifecycleOperation, OperationResult};
    pub use crate::registry::{ExtensionRegistry, RegistryBuilder};
    pub use crate::validator::{ConfigValidator, ValidationResult};
    pub use nautilus_extension_api::prelude::*;
    pub use nautilus_extension_api::Result;
}
