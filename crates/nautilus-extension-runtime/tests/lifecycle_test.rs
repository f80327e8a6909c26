//! End-to-end lifecycle tests

use async_trait::async_trait;
use nautilus_extension_api::testing::{MockExtension, MockHook};
use nautilus_extension_api::{ExtensionMeta, HookResult};
use nautilus_extension_runtime::*;
use parking_lot::Mutex;
use semver::Version;
use std::sync::Arc;
use std::time::Duration;

/// Records the status it observes from inside its own hooks
#[derive(Debug)]
struct StatusRecorder {
    meta: ExtensionMeta,
    seen: Arc<Mutex<Vec<ExtensionStatus>>>,
}

#[async_trait]
impl Extension for StatusRecorder {
    fn meta(&self) -> &ExtensionMeta {
        &self.meta
    }

    fn extension_type(&self) -> &str {
        "cache"
    }

    async fn on_load(&self, ctx: &ExtensionContext) -> HookResult {
        self.seen.lock().push(ctx.status());
        Ok(())
    }

    async fn on_activate(&self, ctx: &ExtensionContext) -> HookResult {
        self.seen.lock().push(ctx.status());
        Ok(())
    }
}

#[tokio::test]
async fn test_status_sequence_through_activation() {
    let registry = ExtensionRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = StatusRecorder {
        meta: ExtensionMeta::new("E1", "E1", Version::new(1, 0, 0)),
        seen: seen.clone(),
    };

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    registry
        .events()
        .subscribe_all(move |event| sink.lock().push(event.name.clone()));

    let load = registry
        .register(
            Arc::new(recorder),
            Some(ExtensionConfigPatch::new().priority(50).enabled(true)),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(load.previous_status, ExtensionStatus::Unloaded);
    seen.lock().push(registry.status("E1").unwrap());

    let activate = registry.activate("E1").await.unwrap();
    assert!(activate.success);
    assert_eq!(activate.operation, LifecycleOperation::Activate);
    seen.lock().push(registry.status("E1").unwrap());

    assert_eq!(
        *seen.lock(),
        vec![
            ExtensionStatus::Loading,
            ExtensionStatus::Loaded,
            ExtensionStatus::Activating,
            ExtensionStatus::Active,
        ]
    );
    assert_eq!(
        *events.lock(),
        vec!["before-load", "after-load", "before-activate", "after-activate"]
    );
}

#[tokio::test]
async fn test_concurrent_activation_is_serialized() {
    let registry = ExtensionRegistry::new();
    let mock = MockExtension::new("cache", "cache");
    registry.register(Arc::new(mock.clone()), None).await.unwrap();

    let (first, second) = tokio::join!(registry.activate("cache"), registry.activate("cache"));
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.success).count(), 1);
    let failed = results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.error_code(), Some(ErrorCode::InvalidStateTransition));
    assert_eq!(mock.calls(MockHook::Activate), 1);
    assert_eq!(registry.status("cache"), Some(ExtensionStatus::Active));
}

#[tokio::test(start_paused = true)]
async fn test_hook_timeout_from_host_config() {
    let host = StaticHostConfig::new().set("runtime.operation_timeout_ms", 2_000);
    let registry = ExtensionRegistry::builder()
        .host_config(Arc::new(host))
        .build();
    assert_eq!(
        registry.lifecycle().config().operation_timeout,
        Some(Duration::from_secs(2))
    );

    let mock = MockExtension::new("slow", "cache");
    mock.hang_on(MockHook::Activate);
    registry.register(Arc::new(mock.clone()), None).await.unwrap();

    let result = registry.activate("slow").await.unwrap();
    assert_eq!(result.error_code(), Some(ErrorCode::Timeout));
    assert_eq!(registry.status("slow"), Some(ExtensionStatus::Error));

    mock.recover();
    assert!(registry.activate("slow").await.unwrap().success);
}

#[tokio::test]
async fn test_reload_and_restart_through_registry() {
    let registry = ExtensionRegistry::new();
    let mock = MockExtension::new("cache", "cache");
    registry.register(Arc::new(mock.clone()), None).await.unwrap();
    registry.activate("cache").await.unwrap();

    let reload = registry.reload("cache").await.unwrap();
    assert!(reload.success);
    assert_eq!(reload.operation, LifecycleOperation::Reload);
    assert_eq!(mock.calls(MockHook::Load), 2);

    let restart = registry.restart("cache").await.unwrap();
    assert!(restart.success);
    assert_eq!(mock.calls(MockHook::Load), 2);
    assert_eq!(mock.calls(MockHook::Activate), 3);
    assert_eq!(registry.status("cache"), Some(ExtensionStatus::Active));
}

#[tokio::test]
async fn test_error_event_payload() {
    let registry = ExtensionRegistry::new();
    let payload = Arc::new(Mutex::new(None));
    let sink = payload.clone();
    registry.events().on(LifecycleEvent::Error, move |event| {
        *sink.lock() = Some(event.payload.clone());
    });

    let mock = MockExtension::new("cache", "cache");
    mock.fail_on(MockHook::Load);
    let result = registry
        .register(Arc::new(mock), None)
        .await
        .unwrap()
        .unwrap();

    assert!(!result.success);
    let payload = payload.lock().clone().unwrap();
    assert_eq!(payload["extensionId"], "cache");
    assert_eq!(payload["error"]["code"], "LOAD_FAILED");
    assert_eq!(payload["error"]["cause"], "load hook failed");
}
