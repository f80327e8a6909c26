//! # Nautilus Health Supervision
//!
//! Periodic health checking of ACTIVE extensions with:
//! - Check results folded into a consecutive-failure counter
//! - Bounded auto-recovery through lifecycle restarts
//! - A system-wide health report
//! - `health-degraded`, `health-recovered` and `recovery-failed` events

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod supervisor;
pub mod tracker;

pub use config::HealthConfig;
pub use supervisor::{HealthSupervisor, SupervisorHandle, SystemHealthReport};
pub use tracker::{HealthStatus, HealthTracker};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::HealthConfig;
    pub use crate::supervisor::{HealthSupervisor, SupervisorHandle, SystemHealthReport};
    pub use crate::tracker::{HealthStatus, HealthTracker};
}
