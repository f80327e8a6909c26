//! Per-extension health records

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nautilus_extension_api::HealthCheckResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Health record of one extension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Extension id
    pub extension_id: String,

    /// Outcome of the latest check
    pub healthy: bool,

    /// When the latest check ran
    pub last_checked: DateTime<Utc>,

    /// Failed checks since the last success
    pub consecutive_failures: u32,

    /// Message of the latest failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Latest check result, when the extension has a health check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<HealthCheckResult>,

    /// Auto-recovery ran out of retries and will not run again until the
    /// extension reports healthy or the record is reset
    pub recovery_exhausted: bool,
}

impl HealthStatus {
    pub(crate) fn new(extension_id: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            healthy: true,
            last_checked: Utc::now(),
            consecutive_failures: 0,
            last_error: None,
            last_result: None,
            recovery_exhausted: false,
        }
    }
}

/// Store of [`HealthStatus`] records keyed by extension id
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    records: Arc<DashMap<String, HealthStatus>>,
}

impl HealthTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful check, resetting the failure counter
    pub fn record_success(
        &self,
        extension_id: &str,
        result: Option<HealthCheckResult>,
    ) -> HealthStatus {
        let mut record = self
            .records
            .entry(extension_id.to_string())
            .or_insert_with(|| HealthStatus::new(extension_id));

        if record.consecutive_failures > 0 {
            debug!(
                extension = %extension_id,
                failures = record.consecutive_failures,
                "Health restored"
            );
        }

        record.healthy = true;
        record.last_checked = Utc::now();
        record.consecutive_failures = 0;
        record.last_error = None;
        record.last_result = result;
        record.recovery_exhausted = false;
        record.clone()
    }

    /// Record a failed check
    pub fn record_failure(
        &self,
        extension_id: &str,
        message: impl Into<String>,
        result: Option<HealthCheckResult>,
    ) -> HealthStatus {
        let message = message.into();
        let mut record = self
            .records
            .entry(extension_id.to_string())
            .or_insert_with(|| HealthStatus::new(extension_id));

        record.healthy = false;
        record.last_checked = Utc::now();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_error = Some(message.clone());
        record.last_result = result;

        warn!(
            extension = %extension_id,
            failures = record.consecutive_failures,
            error = %message,
            "Health check failed"
        );
        record.clone()
    }

    /// Stop auto-recovery for an extension until it is healthy again
    pub fn mark_exhausted(&self, extension_id: &str) {
        if let Some(mut record) = self.records.get_mut(extension_id) {
            record.recovery_exhausted = true;
        }
    }

    /// Current record
    pub fn get(&self, extension_id: &str) -> Option<HealthStatus> {
        self.records.get(extension_id).map(|r| r.clone())
    }

    /// Discard a record
    pub fn remove(&self, extension_id: &str) -> bool {
        self.records.remove(extension_id).is_some()
    }

    /// All records, sorted by id
    pub fn all(&self) -> Vec<HealthStatus> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.extension_id.cmp(&b.extension_id));
        all
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_counter() {
        let tracker = HealthTracker::new();

        let status = tracker.record_failure("cache", "timeout", None);
        assert!(!status.healthy);
        assert_eq!(status.consecutive_failures, 1);

        let status = tracker.record_failure("cache", "refused", None);
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_error.as_deref(), Some("refused"));

        tracker.mark_exhausted("cache");
        assert!(tracker.get("cache").unwrap().recovery_exhausted);

        let status = tracker.record_success("cache", Some(HealthCheckResult::healthy()));
        assert!(status.healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
        assert!(!status.recovery_exhausted);
    }

    #[test]
    fn test_remove() {
        let tracker = HealthTracker::new();
        tracker.record_success("a", None);
        tracker.record_failure("b", "down", None);

        assert_eq!(tracker.len(), 2);
        assert_eq!(
            tracker.all().iter().map(|s| s.extension_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        assert!(tracker.remove("a"));
        assert!(!tracker.remove("a"));
        assert!(tracker.get("a").is_none());
    }
}
