// Per-identity locks for preserve-then-mutate sequences
// A slot exists only while some caller holds or waits on it
// Slot handles are cloned and dropped only under the map lock, so the last one out removes it

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::workspace::paths::FileIdentity;

/// Serializes operations that touch the same file identity
#[derive(Debug, Default)]
pub struct IdentityLocks {
    slots: Mutex<HashMap<FileIdentity, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `identity`
    pub fn with_lock<T>(&self, identity: &FileIdentity, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(identity.clone()).or_default())
        };

        let result = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        drop(slot);
        // Only the map's handle left means nobody else holds or waits on it
        if slots
            .get(identity)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(identity);
        }
        result
    }

    /// Number of identities with a live slot
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_slots_are_released() {
        let locks = IdentityLocks::new();
        let identity = FileIdentity::new("app", "t1", "a.md").unwrap();

        let value = locks.with_lock(&identity, || 42);
        assert_eq!(value, 42);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn test_same_identity_is_serialized() {
        let locks = Arc::new(IdentityLocks::new());
        let identity = FileIdentity::new("app", "t1", "a.md").unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let identity = identity.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    locks.with_lock(&identity, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn test_contended_slots_are_released() {
        use std::sync::Barrier;

        let locks = IdentityLocks::new();
        let identity = FileIdentity::new("app", "t1", "a.md").unwrap();

        for _ in 0..100 {
            let barrier = Barrier::new(4);
            thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        barrier.wait();
                        locks.with_lock(&identity, thread::yield_now);
                    });
                }
            });
            assert_eq!(locks.active(), 0);
        }
    }
}
