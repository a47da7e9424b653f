//! Per-actor locks
//!
//! Every membership operation for an actor runs under that actor's lock.
//! The lock is reentrant because one operation fans out through the whole
//! group tree for the same actor (parent refresh, child add, owner
//! arbitration, sibling teardown). Different actors never share a lock.

use audience_types::ActorId;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::sync::Arc;

/// Shared handle to one actor's lock
pub type ActorLock = Arc<ReentrantMutex<()>>;

/// Table of per-actor reentrant locks
#[derive(Debug, Default)]
pub struct ActorLocks {
    locks: DashMap<ActorId, ActorLock>,
}

impl ActorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for an actor
    pub fn get(&self, actor: ActorId) -> ActorLock {
        self.locks
            .entry(actor)
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .value()
            .clone()
    }

    /// Drop the lock entry for an actor when nobody else holds it.
    ///
    /// Returns true if the entry was removed.
    pub fn prune(&self, actor: ActorId) -> bool {
        self.locks
            .remove_if(&actor, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn clear(&self) {
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_actor_same_lock() {
        let locks = ActorLocks::new();
        let alice = ActorId::from_name("alice");
        let a = locks.get(alice);
        let b = locks.get(alice);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &locks.get(ActorId::from_name("bob"))));
    }

    #[test]
    fn test_lock_is_reentrant() {
        let locks = ActorLocks::new();
        let lock = locks.get(ActorId::from_name("alice"));
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn test_prune_keeps_held_locks() {
        let locks = ActorLocks::new();
        let alice = ActorId::from_name("alice");

        let held = locks.get(alice);
        assert!(!locks.prune(alice));
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.prune(alice));
        assert!(locks.is_empty());
    }
}
