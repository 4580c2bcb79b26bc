//! services/journal/src/sync/mode.rs
//!
//! Decides which store is authoritative for the session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Cloud,
    Local,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Cloud => f.write_str("Cloud Synced"),
            StorageMode::Local => f.write_str("Local Storage"),
        }
    }
}

/// A two-state machine that can only move from `Cloud` to `Local`.
#[derive(Debug)]
pub struct ModeSelector {
    cloud: AtomicBool,
}

impl ModeSelector {
    /// Starts in `Cloud` when a remote store is configured, otherwise in `Local`.
    pub fn new(remote_configured: bool) -> Self {
        Self {
            cloud: AtomicBool::new(remote_configured),
        }
    }

    pub fn mode(&self) -> StorageMode {
        if self.is_cloud() {
            StorageMode::Cloud
        } else {
            StorageMode::Local
        }
    }

    pub fn is_cloud(&self) -> bool {
        self.cloud.load(Ordering::SeqCst)
    }

    /// Switches to `Local` for the rest of the session.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn downgrade(&self, reason: &str) -> bool {
        let was_cloud = self.cloud.swap(false, Ordering::SeqCst);
        if was_cloud {
            warn!(reason, "Falling back to local storage for this session");
        }
        was_cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_mode_follows_configuration() {
        assert_eq!(ModeSelector::new(true).mode(), StorageMode::Cloud);
        assert_eq!(ModeSelector::new(false).mode(), StorageMode::Local);
    }

    #[test]
    fn downgrade_is_one_way() {
        let selector = ModeSelector::new(true);
        assert!(selector.downgrade("user chose offline"));
        assert!(!selector.downgrade("again"));
        assert!(!selector.is_cloud());
        assert_eq!(selector.mode(), StorageMode::Local);
    }

    #[test]
    fn local_selector_never_reports_a_transition() {
        let selector = ModeSelector::new(false);
        assert!(!selector.downgrade("profile fetch failed"));
        assert_eq!(selector.mode(), StorageMode::Local);
    }
}
