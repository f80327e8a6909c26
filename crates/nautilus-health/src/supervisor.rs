//! Periodic health checks with bounded auto-recovery

use crate::config::HealthConfig;
use crate::tracker::{HealthStatus, HealthTracker};
use chrono::{DateTime, Utc};
use nautilus_extension_api::{ExtensionStatus, HealthCheckResult, LifecycleEvent};
use nautilus_extension_runtime::{ExtensionRegistration, ExtensionRegistry};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of probing one extension
enum CheckOutcome {
    Healthy(Option<HealthCheckResult>),
    Unhealthy(String, Option<HealthCheckResult>),
}

/// System-wide health summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthReport {
    /// No registered extension is unhealthy
    pub healthy: bool,

    /// When the report was produced
    pub timestamp: DateTime<Utc>,

    /// Registered extensions
    pub total_extensions: usize,

    /// Extensions that passed
    pub healthy_extensions: usize,

    /// Extensions that failed
    pub unhealthy_extensions: usize,

    /// Per-extension records, in registration order
    pub extensions: Vec<HealthStatus>,
}

/// Handle to a running supervisor loop
#[derive(Debug)]
pub struct SupervisorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for the current tick to finish
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Health supervisor task ended abnormally");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Watches ACTIVE extensions and restarts the ones that stay unhealthy
#[derive(Debug, Clone)]
pub struct HealthSupervisor {
    registry: Arc<ExtensionRegistry>,
    config: HealthConfig,
    tracker: HealthTracker,
}

impl HealthSupervisor {
    /// Create a supervisor with explicit settings
    pub fn new(registry: Arc<ExtensionRegistry>, config: HealthConfig) -> Self {
        Self {
            registry,
            config,
            tracker: HealthTracker::new(),
        }
    }

    /// Create a supervisor configured from the registry's host configuration
    pub fn from_registry(registry: Arc<ExtensionRegistry>) -> Self {
        let config = HealthConfig::from_host(registry.host_config().as_ref());
        Self::new(registry, config)
    }

    /// Settings in use
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Health records
    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    /// Current health record of an extension
    pub fn status(&self, extension_id: &str) -> Option<HealthStatus> {
        self.tracker.get(extension_id)
    }

    /// Spawn the periodic check loop
    ///
    /// The first tick runs one interval after start. When supervision is
    /// disabled, the returned handle is inert.
    pub fn start(&self) -> SupervisorHandle {
        let token = CancellationToken::new();

        if !self.config.enabled {
            info!("Health supervision disabled");
            return SupervisorHandle { token, task: None };
        }

        let supervisor = self.clone();
        let cancelled = token.clone();
        let interval = self.config.interval;

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = interval.as_millis() as u64, "Health supervisor started");

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => supervisor.check_once().await,
                }
            }

            info!("Health supervisor stopped");
        });

        SupervisorHandle {
            token,
            task: Some(task),
        }
    }

    /// Run one tick: check every ACTIVE extension and recover where needed
    pub async fn check_once(&self) {
        let active: Vec<_> = self
            .registry
            .registrations()
            .into_iter()
            .filter(|r| r.status().is_active())
            .collect();

        debug!(extensions = active.len(), "Health check tick");

        for registration in active {
            let status = self.check_extension(&registration).await;

            let needs_recovery = !status.healthy
                && status.consecutive_failures >= self.config.unhealthy_threshold
                && self.config.auto_recovery
                && !status.recovery_exhausted;

            if needs_recovery {
                self.recover(&registration, &status).await;
            }
        }
    }

    /// Re-check every registered extension and summarize
    pub async fn get_system_health_report(&self) -> SystemHealthReport {
        let mut extensions = Vec::new();
        for registration in self.registry.registrations() {
            extensions.push(self.check_extension(&registration).await);
        }

        let healthy_extensions = extensions.iter().filter(|s| s.healthy).count();
        let unhealthy_extensions = extensions.len() - healthy_extensions;

        SystemHealthReport {
            healthy: unhealthy_extensions == 0,
            timestamp: Utc::now(),
            total_extensions: extensions.len(),
            healthy_extensions,
            unhealthy_extensions,
            extensions,
        }
    }

    /// Forget the health record of an extension
    pub fn reset_extension_health(&self, extension_id: &str) -> bool {
        let removed = self.tracker.remove(extension_id);
        if removed {
            info!(extension = %extension_id, "Health record reset");
        }
        removed
    }

    async fn check_extension(&self, registration: &ExtensionRegistration) -> HealthStatus {
        let id = registration.id();
        let status = registration.status();

        // Only ACTIVE extensions are checked and tracked
        if status != ExtensionStatus::Active {
            let mut snapshot = self
                .tracker
                .get(id)
                .unwrap_or_else(|| HealthStatus::new(id));
            snapshot.healthy = false;
            snapshot.last_checked = Utc::now();
            snapshot.last_error = Some(format!("extension is {status}"));
            snapshot.last_result = None;
            return snapshot;
        }

        match self.run_check(registration).await {
            CheckOutcome::Healthy(result) => self.tracker.record_success(id, result),
            CheckOutcome::Unhealthy(message, result) => self.tracker.record_failure(id, message, result),
        }
    }

    async fn run_check(&self, registration: &ExtensionRegistration) -> CheckOutcome {
        let extension = registration.extension();
        if !extension.has_health_check() {
            return CheckOutcome::Healthy(None);
        }

        let check = extension.health_check();
        let outcome = match self.registry.lifecycle().config().operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, check).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return CheckOutcome::Unhealthy(
                        format!("health check did not complete within {}ms", limit.as_millis()),
                        None,
                    )
                }
            },
            None => check.await,
        };

        match outcome {
            Ok(result) if result.healthy => CheckOutcome::Healthy(Some(result)),
            Ok(result) => {
                let message = result
                    .message
                    .clone()
                    .unwrap_or_else(|| "health check reported unhealthy".to_string());
                CheckOutcome::Unhealthy(message, Some(result))
            }
            Err(e) => CheckOutcome::Unhealthy(format!("health check failed: {e}"), None),
        }
    }

    async fn recover(&self, registration: &ExtensionRegistration, status: &HealthStatus) -> bool {
        let id = registration.id();
        let events = self.registry.events();

        warn!(
            extension = %id,
            failures = status.consecutive_failures,
            retries = self.config.recovery_retries,
            "Extension unhealthy, starting recovery"
        );
        events.emit_lifecycle(
            LifecycleEvent::HealthDegraded,
            id,
            json!({
                "consecutiveFailures": status.consecutive_failures,
                "error": status.last_error,
            }),
        );

        for attempt in 1..=self.config.recovery_retries {
            if attempt > 1 {
                tokio::time::sleep(self.config.recovery_interval).await;
            }

            info!(extension = %id, attempt, "Restarting extension");
            match self.registry.restart(id).await {
                Ok(result) if result.success => {}
                Ok(result) => {
                    let reason = result.error.map(|e| e.to_string()).unwrap_or_default();
                    warn!(extension = %id, attempt, error = %reason, "Restart failed");
                }
                Err(e) => {
                    warn!(extension = %id, attempt, error = %e, "Restart failed");
                    break;
                }
            }

            let after = self.check_extension(registration).await;
            if after.healthy {
                info!(extension = %id, attempt, "Extension recovered");
                events.emit_lifecycle(
                    LifecycleEvent::HealthRecovered,
                    id,
                    json!({ "attempts": attempt }),
                );
                return true;
            }
        }

        self.tracker.mark_exhausted(id);
        error!(
            extension = %id,
            retries = self.config.recovery_retries,
            "Recovery failed, extension left running in degraded state"
        );
        events.emit_lifecycle(
            LifecycleEvent::RecoveryFailed,
            id,
            json!({ "attempts": self.config.recovery_retries }),
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_extension_api::testing::{MockExtension, HealthMode};
    use nautilus_extension_api::Extension;

    async fn supervised(mock: &MockExtension) -> HealthSupervisor {
        let registry = ExtensionRegistry::new();
        let extension: Arc<dyn Extension> = Arc::new(mock.clone());
        registry.register(extension, None).await.unwrap();
        registry.activate(&mock.meta().id).await.unwrap();
        HealthSupervisor::new(registry, HealthConfig::default())
    }

    #[tokio::test]
    async fn test_no_health_check_healthy_while_active() {
        let mock = MockExtension::new("cache", "cache");
        let supervisor = supervised(&mock).await;

        supervisor.check_once().await;
        let status = supervisor.status("cache").unwrap();
        assert!(status.healthy);
        assert!(status.last_result.is_none());
    }

    #[tokio::test]
    async fn test_check_error_counts_as_failure() {
        let mock = MockExtension::new("cache", "cache").with_health_check(HealthMode::Error);
        let supervisor = supervised(&mock).await;

        supervisor.check_once().await;
        supervisor.check_once().await;

        let status = supervisor.status("cache").unwrap();
        assert!(!status.healthy);
        assert_eq!(status.consecutive_failures, 2);
        assert!(status.last_error.unwrap().contains("mock health check error"));
    }

    #[tokio::test]
    async fn test_inactive_extensions_are_skipped() {
        let mock = MockExtension::new("cache", "cache").with_health_check(HealthMode::Unhealthy);
        let supervisor = supervised(&mock).await;
        supervisor.registry.deactivate("cache").await;

        supervisor.check_once().await;
        assert!(supervisor.status("cache").is_none());
    }

    #[tokio::test]
    async fn test_reset_extension_health() {
        let mock = MockExtension::new("cache", "cache").with_health_check(HealthMode::Unhealthy);
        let supervisor = supervised(&mock).await;

        supervisor.check_once().await;
        assert!(supervisor.reset_extension_health("cache"));
        assert!(supervisor.status("cache").is_none());
        assert!(!supervisor.reset_extension_health("cache"));
    }

    #[tokio::test]
    async fn test_disabled_supervisor_is_inert() {
        let mock = MockExtension::new("cache", "cache");
        let mut supervisor = supervised(&mock).await;
        supervisor.config.enabled = false;

        let handle = supervisor.start();
        assert!(!handle.is_running());
        handle.stop().await;
    }
}
