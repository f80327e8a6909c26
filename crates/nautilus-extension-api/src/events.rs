//! Typed publish/subscribe for lifecycle and domain events
//!
//! One [`EventBus`] is shared by the registry, the lifecycle manager, the
//! health supervisor and every extension context. Handlers run synchronously
//! inside `emit`, so an operation that emits an event returns only after all
//! handlers have seen it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Fixed names of the events emitted by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// Before `on_load` runs
    BeforeLoad,
    /// After the extension reached LOADED
    AfterLoad,
    /// Before `on_activate` runs
    BeforeActivate,
    /// After the extension reached ACTIVE
    AfterActivate,
    /// Before `on_deactivate` runs
    BeforeDeactivate,
    /// After the extension reached INACTIVE
    AfterDeactivate,
    /// Before `on_unload` runs
    BeforeUnload,
    /// After the extension reached UNLOADED
    AfterUnload,
    /// Configuration was updated
    ConfigChanged,
    /// A lifecycle operation failed
    Error,
    /// Consecutive check failures reached the unhealthy threshold
    HealthDegraded,
    /// Auto-recovery brought the extension back to healthy
    HealthRecovered,
    /// Auto-recovery gave up
    RecoveryFailed,
}

impl LifecycleEvent {
    /// Event name on the bus
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::BeforeLoad => "before-load",
            LifecycleEvent::AfterLoad => "after-load",
            LifecycleEvent::BeforeActivate => "before-activate",
            LifecycleEvent::AfterActivate => "after-activate",
            LifecycleEvent::BeforeDeactivate => "before-deactivate",
            LifecycleEvent::AfterDeactivate => "after-deactivate",
            LifecycleEvent::BeforeUnload => "before-unload",
            LifecycleEvent::AfterUnload => "after-unload",
            LifecycleEvent::ConfigChanged => "config-changed",
            LifecycleEvent::Error => "error",
            LifecycleEvent::HealthDegraded => "health-degraded",
            LifecycleEvent::HealthRecovered => "health-recovered",
            LifecycleEvent::RecoveryFailed => "recovery-failed",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub name: String,

    /// Event payload
    pub payload: Value,

    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Extension the event concerns, if any
    pub fn extension_id(&self) -> Option<&str> {
        self.payload.get("extensionId").and_then(Value::as_str)
    }

    /// Check the event name against a lifecycle event
    pub fn is(&self, kind: LifecycleEvent) -> bool {
        self.name == kind.as_str()
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    named: RwLock<HashMap<String, Vec<(u64, Handler)>>>,
    wildcard: RwLock<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Event bus shared across the runtime
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event name
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let event = event.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .named
            .write()
            .entry(event.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event: Some(event),
            id,
        }
    }

    /// Subscribe to one lifecycle event
    pub fn on<F>(&self, kind: LifecycleEvent, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(kind.as_str(), handler)
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.wildcard.write().push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event: None,
            id,
        }
    }

    /// Emit an event, returning how many handlers received it
    pub fn emit(&self, event: impl Into<String>, payload: Value) -> usize {
        let event = Event {
            name: event.into(),
            payload,
            timestamp: Utc::now(),
        };

        // Handlers are cloned out so they may subscribe or unsubscribe re-entrantly.
        let mut handlers: Vec<Handler> = self
            .inner
            .named
            .read()
            .get(&event.name)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        handlers.extend(self.inner.wildcard.read().iter().map(|(_, h)| h.clone()));

        for handler in &handlers {
            handler(&event);
        }

        handlers.len()
    }

    /// Emit a lifecycle event for an extension
    ///
    /// `extra` must be a JSON object (or null); its keys are merged next to
    /// `extensionId` in the payload.
    pub fn emit_lifecycle(&self, kind: LifecycleEvent, extension_id: &str, extra: Value) -> usize {
        let mut payload = Map::new();
        payload.insert("extensionId".to_string(), json!(extension_id));
        if let Value::Object(extra) = extra {
            payload.extend(extra);
        }
        self.emit(kind.as_str(), Value::Object(payload))
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let named: usize = self.inner.named.read().values().map(Vec::len).sum();
        named + self.inner.wildcard.read().len()
    }
}

/// Handle returned by [`EventBus::subscribe`]
///
/// Dropping the handle leaves the handler subscribed; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    event: Option<String>,
    id: u64,
}

impl Subscription {
    /// Remove the handler from the bus
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };

        match &self.event {
            Some(event) => {
                let mut named = bus.named.write();
                let Some(list) = named.get_mut(event) else {
                    return false;
                };
                let before = list.len();
                list.retain(|(id, _)| *id != self.id);
                let removed = list.len() != before;
                if list.is_empty() {
                    named.remove(event);
                }
                removed
            }
            None => {
                let mut wildcard = bus.wildcard.write();
                let before = wildcard.len();
                wildcard.retain(|(id, _)| *id != self.id);
                wildcard.len() != before
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.on(LifecycleEvent::AfterLoad, move |event| {
            sink.lock().push(event.extension_id().map(String::from));
        });

        assert_eq!(bus.emit_lifecycle(LifecycleEvent::AfterLoad, "cache", Value::Null), 1);
        assert_eq!(bus.emit_lifecycle(LifecycleEvent::AfterUnload, "cache", Value::Null), 0);
        assert_eq!(*seen.lock(), vec![Some("cache".to_string())]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = count.clone();
        let sub = bus.subscribe("custom", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let all = bus.subscribe_all(|_| {});
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit("custom", Value::Null);
        assert!(sub.unsubscribe());
        bus.emit("custom", Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(all.unsubscribe());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_lifecycle_payload() {
        let bus = EventBus::new();
        let payload = Arc::new(Mutex::new(Value::Null));

        let sink = payload.clone();
        bus.subscribe_all(move |event| {
            *sink.lock() = event.payload.clone();
        });

        bus.emit_lifecycle(
            LifecycleEvent::Error,
            "storage",
            json!({ "error": { "code": "LOAD_FAILED" } }),
        );

        let payload = payload.lock();
        assert_eq!(payload["extensionId"], "storage");
        assert_eq!(payload["error"]["code"], "LOAD_FAILED");
    }

    #[test]
    fn test_reentrant_subscribe() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        bus.subscribe("outer", move |_| {
            inner_bus.subscribe("inner", |_| {});
        });

        bus.emit("outer", Value::Null);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::BeforeDeactivate.as_str(), "before-deactivate");
        assert_eq!(
            serde_json::to_value(LifecycleEvent::ConfigChanged).unwrap(),
            "config-changed"
        );
    }
}
