//! # Memory Cache Extension
//!
//! A bounded in-process key/value cache, registered under the `cache`
//! extension type.
//!
//! ## Settings
//!
//! - `max_entries` (number, default 1024): capacity; the oldest entry is
//!   evicted when a new key would exceed it
//! - `announce_evictions` (boolean, default false): emit `cache.evicted`
//!   for every eviction
//!
//! The cache only serves reads and writes while ACTIVE. Unloading drops all
//! entries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memory_cache::MemoryCache;
//! use nautilus_extension_runtime::ExtensionRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ExtensionRegistry::new();
//! let cache = Arc::new(MemoryCache::new());
//! registry.register(cache.clone(), None).await?;
//! registry.activate(MemoryCache::ID).await?;
//!
//! cache.set("greeting", serde_json::json!("hello"))?;
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

use async_trait::async_trait;
use nautilus_extension_api::prelude::*;
use parking_lot::Mutex;
use semver::Version;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Cache access errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    /// Reads and writes are only served while ACTIVE
    #[error("cache is not active")]
    Inactive,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Stored entries
    pub entries: usize,
    /// Configured capacity
    pub capacity: usize,
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
}

#[derive(Debug)]
struct Store {
    entries: HashMap<String, Value>,
    // Insertion order, oldest first
    order: VecDeque<String>,
    capacity: usize,
    announce_evictions: bool,
    active: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Store {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: DEFAULT_MAX_ENTRIES,
            announce_evictions: false,
            active: false,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn apply(&mut self, config: &ExtensionConfig) -> Vec<String> {
        self.capacity = max_entries(config);
        self.announce_evictions = config
            .setting("announce_evictions")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.shrink()
    }

    fn shrink(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
            evicted.push(oldest);
        }
        evicted
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

fn max_entries(config: &ExtensionConfig) -> usize {
    config
        .setting("max_entries")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_ENTRIES)
}

/// Bounded in-memory cache extension
#[derive(Debug)]
pub struct MemoryCache {
    meta: ExtensionMeta,
    store: Mutex<Store>,
    // Context captured on load, used to announce evictions
    context: Mutex<Option<ExtensionContext>>,
}

impl MemoryCache {
    /// Extension id
    pub const ID: &'static str = "memory-cache";

    /// Extension type
    pub const TYPE: &'static str = "cache";

    /// Create an unloaded cache
    pub fn new() -> Self {
        Self {
            meta: ExtensionMeta::new(Self::ID, "Memory Cache", Version::new(1, 0, 0))
                .description("Bounded in-process key/value cache")
                .tag("cache"),
            store: Mutex::new(Store::new()),
            context: Mutex::new(None),
        }
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut store = self.store.lock();
        if !store.active {
            return Err(CacheError::Inactive);
        }

        let value = store.entries.get(key).cloned();
        match value {
            Some(_) => store.hits += 1,
            None => store.misses += 1,
        }
        Ok(value)
    }

    /// Store a value, returning the previous one
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<Option<Value>, CacheError> {
        let key = key.into();
        let (previous, evicted) = {
            let mut store = self.store.lock();
            if !store.active {
                return Err(CacheError::Inactive);
            }

            let previous = store.entries.insert(key.clone(), value);
            if previous.is_none() {
                store.order.push_back(key);
            }
            let evicted = store.shrink();
            let announce = store.announce_evictions;
            (previous, if announce { evicted } else { Vec::new() })
        };

        self.announce(evicted);
        Ok(previous)
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut store = self.store.lock();
        if !store.active {
            return Err(CacheError::Inactive);
        }

        let removed = store.entries.remove(key);
        if removed.is_some() {
            store.order.retain(|k| k != key);
        }
        Ok(removed)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        self.store.lock().stats()
    }

    fn announce(&self, evicted: Vec<String>) {
        if evicted.is_empty() {
            return;
        }
        let context = self.context.lock().clone();
        if let Some(ctx) = context {
            for key in evicted {
                ctx.emit("cache.evicted", json!({ "key": key }));
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for MemoryCache {
    fn meta(&self) -> &ExtensionMeta {
        &self.meta
    }

    fn extension_type(&self) -> &str {
        Self::TYPE
    }

    fn capabilities(&self) -> ExtensionCapabilities {
        ExtensionCapabilities::new()
            .field(
                "max_entries",
                FieldSchema::number()
                    .default_value(DEFAULT_MAX_ENTRIES)
                    .range(Some(1.0), None)
                    .describe("Maximum number of entries before eviction"),
            )
            .field(
                "announce_evictions",
                FieldSchema::boolean()
                    .default_value(false)
                    .describe("Emit cache.evicted for every evicted key"),
            )
            .feature("key-value")
    }

    async fn on_load(&self, ctx: &ExtensionContext) -> HookResult {
        self.store.lock().apply(&ctx.config());
        *self.context.lock() = Some(ctx.clone());

        debug!(
            extension = ctx.extension_id(),
            capacity = self.store.lock().capacity,
            "Memory cache loaded"
        );
        Ok(())
    }

    async fn on_unload(&self, ctx: &ExtensionContext) -> HookResult {
        self.store.lock().clear();
        self.context.lock().take();

        debug!(extension = ctx.extension_id(), "Memory cache unloaded");
        Ok(())
    }

    async fn on_activate(&self, ctx: &ExtensionContext) -> HookResult {
        let capacity = {
            let mut store = self.store.lock();
            store.active = true;
            store.capacity
        };

        info!(extension = ctx.extension_id(), capacity, "Memory cache serving");
        ctx.emit("cache.ready", json!({ "capacity": capacity }));
        Ok(())
    }

    async fn on_deactivate(&self, ctx: &ExtensionContext) -> HookResult {
        self.store.lock().active = false;

        debug!(extension = ctx.extension_id(), "Memory cache paused");
        Ok(())
    }

    async fn on_config_change(&self, old: &ExtensionConfig, new: &ExtensionConfig) -> HookResult {
        let evicted = self.store.lock().apply(new);

        info!(
            old_capacity = max_entries(old),
            new_capacity = max_entries(new),
            evicted = evicted.len(),
            "Memory cache reconfigured"
        );

        if self.store.lock().announce_evictions {
            self.announce(evicted);
        }
        Ok(())
    }

    fn has_health_check(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<HealthCheckResult, BoxError> {
        let (active, stats) = {
            let store = self.store.lock();
            (store.active, store.stats())
        };

        let result = if active {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::unhealthy("cache is not serving")
        };
        Ok(result.with_details(serde_json::to_value(stats)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_store(capacity: usize) -> Store {
        let mut store = Store::new();
        store.capacity = capacity;
        store.active = true;
        store
    }

    #[test]
    fn test_shrink_evicts_oldest() {
        let mut store = active_store(2);
        for key in ["a", "b", "c"] {
            store.entries.insert(key.to_string(), json!(key));
            store.order.push_back(key.to_string());
        }

        assert_eq!(store.shrink(), vec!["a".to_string()]);
        assert_eq!(store.entries.len(), 2);
        assert_eq!(store.evictions, 1);
    }

    #[test]
    fn test_apply_reads_settings() {
        let mut store = Store::new();
        let config = ExtensionConfig::default()
            .with_setting("max_entries", 8)
            .with_setting("announce_evictions", true);

        store.apply(&config);
        assert_eq!(store.capacity, 8);
        assert!(store.announce_evictions);

        store.apply(&ExtensionConfig::default());
        assert_eq!(store.capacity, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_inactive_cache_rejects_access() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a"), Err(CacheError::Inactive));
        assert_eq!(cache.set("a", json!(1)), Err(CacheError::Inactive));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_schema_declares_defaults() {
        let capabilities = MemoryCache::new().capabilities();
        let max = &capabilities.config_schema["max_entries"];
        assert_eq!(max.default, Some(json!(DEFAULT_MAX_ENTRIES)));
        assert_eq!(max.min, Some(1.0));
    }
}
