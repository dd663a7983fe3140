//! In-memory snapshot store
//!
//! Same single-slot semantics as the disk store, without touching the
//! filesystem. Useful for tests and for short-lived workspaces.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::{SnapshotScope, SnapshotStats, SnapshotStore};
use crate::error::Result;
use crate::workspace::paths::FileIdentity;

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: Mutex<BTreeMap<FileIdentity, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, BTreeMap<FileIdentity, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn preserve(&self, identity: &FileIdentity, content: &str) -> Result<()> {
        self.slots().insert(identity.clone(), content.to_string());
        Ok(())
    }

    fn load(&self, identity: &FileIdentity) -> Result<Option<String>> {
        Ok(self.slots().get(identity).cloned())
    }

    fn discard(&self, identity: &FileIdentity) -> Result<bool> {
        Ok(self.slots().remove(identity).is_some())
    }

    fn identities(&self, scope: SnapshotScope<'_>) -> Result<Vec<FileIdentity>> {
        Ok(self
            .slots()
            .keys()
            .filter(|identity| scope.contains(identity))
            .cloned()
            .collect())
    }

    fn stats(&self) -> SnapshotStats {
        let slots = self.slots();
        SnapshotStats {
            count: slots.len(),
            total_bytes: slots.values().map(|c| c.len() as u64).sum(),
        }
    }

    fn clear_all(&self) -> usize {
        let mut slots = self.slots();
        let count = slots.len();
        slots.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserve_overwrites() {
        let store = MemorySnapshotStore::new();
        let identity = FileIdentity::new("app", "t1", "a.md").unwrap();

        store.preserve(&identity, "A").unwrap();
        store.preserve(&identity, "BB").unwrap();

        assert_eq!(store.load(&identity).unwrap().as_deref(), Some("BB"));
        assert_eq!(
            store.stats(),
            SnapshotStats {
                count: 1,
                total_bytes: 2
            }
        );
    }

    #[test]
    fn test_discard_and_clear_are_idempotent() {
        let store = MemorySnapshotStore::new();
        let identity = FileIdentity::new("app", "t1", "a.md").unwrap();

        assert!(!store.discard(&identity).unwrap());
        store.preserve(&identity, "A").unwrap();
        assert!(store.discard(&identity).unwrap());
        assert!(!store.discard(&identity).unwrap());

        store.preserve(&identity, "A").unwrap();
        assert_eq!(store.clear_all(), 1);
        assert_eq!(store.clear_all(), 0);
        assert_eq!(store.stats(), SnapshotStats::default());
        assert!(store.location(&identity).is_none());
    }
}
