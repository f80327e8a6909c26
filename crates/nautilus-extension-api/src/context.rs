//! Per-extension context handed to lifecycle hooks

use crate::config::ExtensionConfig;
use crate::events::{EventBus, Subscription};
use crate::extension::Extension;
use crate::status::{ExtensionStatus, StatusView};
use crate::Event;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Weak};

/// Read access to the catalog of registered extensions
///
/// Implemented by the registry. Contexts hold it weakly so an extension can
/// never keep the registry alive or reach its internals.
pub trait ExtensionDirectory: Send + Sync {
    /// Look up an extension by id
    fn extension(&self, id: &str) -> Option<Arc<dyn Extension>>;

    /// All extensions of a type, in registration order
    fn extensions_by_type(&self, extension_type: &str) -> Vec<Arc<dyn Extension>>;

    /// Current status of an extension
    fn status_of(&self, id: &str) -> Option<ExtensionStatus>;
}

/// Handle given to an extension for its whole lifetime
#[derive(Clone)]
pub struct ExtensionContext {
    extension_id: String,
    extension_type: String,
    config: Arc<RwLock<ExtensionConfig>>,
    status: StatusView,
    directory: Weak<dyn ExtensionDirectory>,
    events: EventBus,
    span: tracing::Span,
}

impl fmt::Debug for ExtensionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionContext")
            .field("extension_id", &self.extension_id)
            .field("extension_type", &self.extension_type)
            .field("status", &self.status.get())
            .finish()
    }
}

impl ExtensionContext {
    /// Create a context
    ///
    /// `config` is the live configuration cell; the creator keeps the only
    /// writable handle to it.
    pub fn new(
        extension_id: impl Into<String>,
        extension_type: impl Into<String>,
        config: Arc<RwLock<ExtensionConfig>>,
        status: StatusView,
        directory: Weak<dyn ExtensionDirectory>,
        events: EventBus,
    ) -> Self {
        let extension_id = extension_id.into();
        let extension_type = extension_type.into();
        let span = tracing::info_span!(
            "extension",
            id = %extension_id,
            kind = %extension_type
        );

        Self {
            extension_id,
            extension_type,
            config,
            status,
            directory,
            events,
            span,
        }
    }

    /// Id of the owning extension
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Type of the owning extension
    pub fn extension_type(&self) -> &str {
        &self.extension_type
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> ExtensionConfig {
        self.config.read().clone()
    }

    /// A single setting from the live configuration
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.config.read().settings.get(key).cloned()
    }

    /// Current lifecycle status
    pub fn status(&self) -> ExtensionStatus {
        self.status.get()
    }

    /// Tracing span scoped to this extension
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Look up another extension
    pub fn get_extension(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.directory.upgrade()?.extension(id)
    }

    /// Extensions of a type
    pub fn get_extensions_by_type(&self, extension_type: &str) -> Vec<Arc<dyn Extension>> {
        self.directory
            .upgrade()
            .map(|d| d.extensions_by_type(extension_type))
            .unwrap_or_default()
    }

    /// Status of another extension
    pub fn status_of(&self, id: &str) -> Option<ExtensionStatus> {
        self.directory.upgrade()?.status_of(id)
    }

    /// Emit a domain event
    ///
    /// Object payloads get `extensionId` filled in when missing.
    pub fn emit(&self, event: impl Into<String>, payload: Value) -> usize {
        let payload = match payload {
            Value::Object(mut map) => {
                map.entry("extensionId")
                    .or_insert_with(|| json!(self.extension_id));
                Value::Object(map)
            }
            Value::Null => json!({ "extensionId": self.extension_id }),
            other => other,
        };
        self.events.emit(event, payload)
    }

    /// Subscribe to an event
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StaticDirectory {
        statuses: HashMap<String, ExtensionStatus>,
    }

    impl ExtensionDirectory for StaticDirectory {
        fn extension(&self, _id: &str) -> Option<Arc<dyn Extension>> {
            None
        }

        fn extensions_by_type(&self, _extension_type: &str) -> Vec<Arc<dyn Extension>> {
            Vec::new()
        }

        fn status_of(&self, id: &str) -> Option<ExtensionStatus> {
            self.statuses.get(id).copied()
        }
    }

    fn context(directory: &Arc<dyn ExtensionDirectory>, events: EventBus) -> ExtensionContext {
        ExtensionContext::new(
            "cache",
            "cache",
            Arc::new(RwLock::new(ExtensionConfig::default().with_setting("ttl", 30))),
            StatusView::new(Arc::new(RwLock::new(ExtensionStatus::Loaded))),
            Arc::downgrade(directory),
            events,
        )
    }

    #[test]
    fn test_context_accessors() {
        let mut statuses = HashMap::new();
        statuses.insert("storage".to_string(), ExtensionStatus::Active);
        let directory: Arc<dyn ExtensionDirectory> = Arc::new(StaticDirectory { statuses });

        let ctx = context(&directory, EventBus::new());
        assert_eq!(ctx.extension_id(), "cache");
        assert_eq!(ctx.status(), ExtensionStatus::Loaded);
        assert_eq!(ctx.setting("ttl"), Some(json!(30)));
        assert_eq!(ctx.status_of("storage"), Some(ExtensionStatus::Active));
        assert!(ctx.get_extension("storage").is_none());
    }

    #[test]
    fn test_context_outlives_directory() {
        let directory: Arc<dyn ExtensionDirectory> = Arc::new(StaticDirectory::default());
        let ctx = context(&directory, EventBus::new());
        drop(directory);

        assert!(ctx.status_of("anything").is_none());
        assert!(ctx.get_extensions_by_type("cache").is_empty());
    }

    #[test]
    fn test_emit_fills_extension_id() {
        let directory: Arc<dyn ExtensionDirectory> = Arc::new(StaticDirectory::default());
        let events = EventBus::new();
        let seen = Arc::new(RwLock::new(None));

        let sink = seen.clone();
        events.subscribe("cache.evicted", move |event| {
            *sink.write() = event.extension_id().map(String::from);
        });

        let ctx = context(&directory, events);
        assert_eq!(ctx.emit("cache.evicted", json!({ "key": "a" })), 1);
        assert_eq!(seen.read().as_deref(), Some("cache"));
    }
}
