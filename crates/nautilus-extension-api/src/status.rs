//! Extension status and the lifecycle transition table

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionStatus {
    /// Registered but not loaded
    Unloaded,
    /// `on_load` is running
    Loading,
    /// Loaded but not serving
    Loaded,
    /// `on_activate` is running
    Activating,
    /// Serving
    Active,
    /// `on_deactivate` is running
    Deactivating,
    /// Deactivated, load-time resources kept
    Inactive,
    /// A lifecycle operation failed
    Error,
}

impl ExtensionStatus {
    /// All statuses, in declaration order
    pub const ALL: [ExtensionStatus; 8] = [
        ExtensionStatus::Unloaded,
        ExtensionStatus::Loading,
        ExtensionStatus::Loaded,
        ExtensionStatus::Activating,
        ExtensionStatus::Active,
        ExtensionStatus::Deactivating,
        ExtensionStatus::Inactive,
        ExtensionStatus::Error,
    ];

    /// Statuses reachable from this one
    pub fn allowed_transitions(&self) -> &'static [ExtensionStatus] {
        use ExtensionStatus::*;
        match self {
            Unloaded => &[Loading],
            Loading => &[Loaded, Error, Unloaded],
            Loaded => &[Activating, Unloaded],
            Activating => &[Active, Error, Loaded],
            Active => &[Deactivating],
            Deactivating => &[Inactive, Error, Active],
            Inactive => &[Activating, Unloaded],
            Error => &[Unloaded, Loading],
        }
    }

    /// Check whether `self -> next` is in the transition table
    pub fn can_transition_to(&self, next: ExtensionStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Check if the extension is serving
    pub fn is_active(&self) -> bool {
        matches!(self, ExtensionStatus::Active)
    }

    /// Check if a lifecycle hook is currently running
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ExtensionStatus::Loading | ExtensionStatus::Activating | ExtensionStatus::Deactivating
        )
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Unloaded => "UNLOADED",
            ExtensionStatus::Loading => "LOADING",
            ExtensionStatus::Loaded => "LOADED",
            ExtensionStatus::Activating => "ACTIVATING",
            ExtensionStatus::Active => "ACTIVE",
            ExtensionStatus::Deactivating => "DEACTIVATING",
            ExtensionStatus::Inactive => "INACTIVE",
            ExtensionStatus::Error => "ERROR",
        }
    }
}

impl Default for ExtensionStatus {
    fn default() -> Self {
        ExtensionStatus::Unloaded
    }
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an extension's status
///
/// The runtime owns the underlying cell; extensions and other observers only
/// ever get this view.
#[derive(Debug, Clone)]
pub struct StatusView {
    inner: Arc<RwLock<ExtensionStatus>>,
}

impl StatusView {
    /// Wrap a status cell
    pub fn new(inner: Arc<RwLock<ExtensionStatus>>) -> Self {
        Self { inner }
    }

    /// Current status
    pub fn get(&self) -> ExtensionStatus {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ExtensionStatus::*;

        assert!(Unloaded.can_transition_to(Loading));
        assert!(!Unloaded.can_transition_to(Active));
        assert!(Loaded.can_transition_to(Activating));
        assert!(!Active.can_transition_to(Activating));
        assert!(!Active.can_transition_to(Unloaded));
        assert!(Error.can_transition_to(Loading));
        assert!(Inactive.can_transition_to(Unloaded));
    }

    #[test]
    fn test_transitional() {
        assert!(ExtensionStatus::Loading.is_transitional());
        assert!(!ExtensionStatus::Active.is_transitional());
        assert!(ExtensionStatus::Active.is_active());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ExtensionStatus::Deactivating).unwrap();
        assert_eq!(json, "\"DEACTIVATING\"");
        assert_eq!(ExtensionStatus::Inactive.to_string(), "INACTIVE");
    }

    #[test]
    fn test_status_view() {
        let cell = Arc::new(RwLock::new(ExtensionStatus::Unloaded));
        let view = StatusView::new(cell.clone());
        assert_eq!(view.get(), ExtensionStatus::Unloaded);

        *cell.write() = ExtensionStatus::Active;
        assert_eq!(view.get(), ExtensionStatus::Active);
    }
}
