//! Health check result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of an extension health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the extension considers itself healthy
    pub healthy: bool,

    /// Optional message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Extension-specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// When the check ran
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Healthy result
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Unhealthy result with a message
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
