//! # Nautilus Extension API
//!
//! The contract between the Nautilus extension runtime and the capability
//! providers it hosts.
//!
//! ## Contents
//!
//! - **Extension**: identity, hooks and optional health check
//! - **Capabilities**: declared configuration schema
//! - **Status**: lifecycle states and the transition table
//! - **Context**: per-extension handle for config, lookups and events
//! - **Events**: typed publish/subscribe shared by the whole runtime
//!
//! ## Example
//!
//! ```rust,no_run
//! use nautilus_extension_api::prelude::*;
//! use semver::Version;
//!
//! #[derive(Debug)]
//! struct Mailer {
//!     meta: ExtensionMeta,
//! }
//!
//! #[async_trait]
//! impl Extension for Mailer {
//!     fn meta(&self) -> &ExtensionMeta {
//!         &self.meta
//!     }
//!
//!     fn extension_type(&self) -> &str {
//!         "notification"
//!     }
//!
//!     async fn on_activate(&self, ctx: &ExtensionContext) -> HookResult {
//!         let _enter = ctx.span().enter();
//!         tracing::info!("mailer ready");
//!         Ok(())
//!     }
//! }
//!
//! let mailer = Mailer {
//!     meta: ExtensionMeta::new("mailer", "Mailer", Version::new(1, 0, 0)),
//! };
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod extension;
pub mod health;
pub mod schema;
pub mod status;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{priority, ExtensionConfig, ExtensionConfigPatch};
pub use context::{ExtensionContext, ExtensionDirectory};
pub use error::{BoxError, ErrorCode, ExtensionError, HookResult, Result};
pub use events::{Event, EventBus, LifecycleEvent, Subscription};
pub use extension::{Extension, ExtensionDependency, ExtensionMeta};
pub use health::HealthCheckResult;
pub use schema::{ConfigSchema, ExtensionCapabilities, FieldSchema, FieldType};
pub use status::{ExtensionStatus, StatusView};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::config::{priority, ExtensionConfig, ExtensionConfigPatch};
    pub use crate::context::ExtensionContext;
    pub use crate::error::{BoxError, ErrorCode, ExtensionError, HookResult};
    pub use crate::events::{EventBus, LifecycleEvent};
    pub use crate::extension::{Extension, ExtensionDependency, ExtensionMeta};
    pub use crate::health::HealthCheckResult;
    pub use crate::schema::{ExtensionCapabilities, FieldSchema, FieldType};
    pub use crate::status::ExtensionStatus;
    pub use async_trait::async_trait;
}
