//! Membership sets
//!
//! A membership set is the "currently in audience" set of one group. Every
//! mutation reports whether the set crossed the empty boundary, atomically
//! with the mutation, so displays can drive their activation lifecycle
//! without a second read.

use audience_types::ActorId;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Outcome of [`MembershipSet::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// The actor was not present before
    pub inserted: bool,

    /// The set was empty right before this insertion
    pub was_empty: bool,
}

/// Outcome of [`MembershipSet::remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// The actor was present before
    pub removed: bool,

    /// The set is empty right after this removal
    pub now_empty: bool,
}

/// Ordered, thread-safe set of actors
#[derive(Debug, Default)]
pub struct MembershipSet {
    actors: RwLock<BTreeSet<ActorId>>,
}

impl MembershipSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an actor
    pub fn insert(&self, actor: ActorId) -> Insertion {
        let mut actors = self.actors.write();
        let was_empty = actors.is_empty();
        let inserted = actors.insert(actor);
        Insertion {
            inserted,
            was_empty,
        }
    }

    /// Remove an actor
    pub fn remove(&self, actor: ActorId) -> Removal {
        let mut actors = self.actors.write();
        let removed = actors.remove(&actor);
        Removal {
            removed,
            now_empty: actors.is_empty(),
        }
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.actors.read().contains(&actor)
    }

    pub fn len(&self) -> usize {
        self.actors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.read().is_empty()
    }

    /// Current members in ascending order
    pub fn snapshot(&self) -> Vec<ActorId> {
        self.actors.read().iter().copied().collect()
    }
}
