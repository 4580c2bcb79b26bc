//! services/journal/src/sync/transaction.rs
//!
//! Snapshot-apply-commit/rollback around a single optimistic mutation.

use super::view::JournalView;

/// Holds the state as it was before an optimistic change.
///
/// Dropping the transaction (or calling `commit`) keeps the change;
/// `rollback` puts the snapshot back exactly.
#[must_use = "an optimistic update must be committed or rolled back"]
#[derive(Debug)]
pub struct OptimisticUpdate {
    operation: &'static str,
    snapshot: JournalView,
}

impl OptimisticUpdate {
    pub fn begin(operation: &'static str, view: &JournalView) -> Self {
        Self {
            operation,
            snapshot: view.clone(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn commit(self) {}

    pub fn rollback(self, view: &mut JournalView) {
        *view = self.snapshot;
    }
}
