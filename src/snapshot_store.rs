//! A thread-safe in-memory holder for the currently active snapshot. [`SnapshotStore`] provides
//! concurrent access for readers (evaluation) and writers (the repository).
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::Snapshot;

/// `SnapshotStore` holds the active [`Snapshot`].
///
/// A snapshot is immutable and is only ever replaced wholesale, so a reader that took a snapshot
/// keeps seeing the same features and segments for as long as it holds it.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding an empty snapshot.
    pub fn new() -> SnapshotStore {
        SnapshotStore::default()
    }

    /// Get the currently active snapshot.
    pub fn get_snapshot(&self) -> Arc<Snapshot> {
        // Readers and writers never panic while holding the lock, and a poisoned `Arc` is still
        // a complete snapshot.
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&snapshot)
    }

    /// Replace the active snapshot, returning the previous one.
    pub fn set_snapshot(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut slot, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SnapshotStore;
    use crate::models::{ClientFeatures, FeatureDefinition, Snapshot};

    fn snapshot_with(name: &str) -> Arc<Snapshot> {
        Arc::new(ClientFeatures::new(vec![FeatureDefinition::new(name, true)], vec![]).into())
    }

    #[test]
    fn starts_empty() {
        assert!(SnapshotStore::new().get_snapshot().is_empty());
    }

    #[test]
    fn can_set_snapshot_from_another_thread() {
        let store = Arc::new(SnapshotStore::new());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_snapshot(snapshot_with("from-thread"));
            })
            .join();
        }

        assert!(store.get_snapshot().get_feature("from-thread").is_some());
    }

    #[test]
    fn readers_keep_their_snapshot_across_replacement() {
        let store = SnapshotStore::new();
        store.set_snapshot(snapshot_with("old"));

        let held = store.get_snapshot();
        let previous = store.set_snapshot(snapshot_with("new"));

        assert!(Arc::ptr_eq(&held, &previous));
        assert!(held.get_feature("old").is_some());
        assert!(store.get_snapshot().get_feature("new").is_some());
    }
}
