//! Manager interface
//!
//! Displays never hold references to each other. Every cross-group step
//! (propagating to children, resolving an owner's group, finding the
//! siblings of a display kind) goes through the manager by id, so a stale
//! reference simply resolves to nothing.

use crate::display::Audience;
use crate::events::EventBus;
use crate::locks::ActorLock;
use crate::metrics::AudienceMetrics;
use crate::single::OwnershipTable;
use audience_types::{ActorId, DisplayKind, GroupId, GroupRef};
use std::sync::Arc;

/// Services a display needs from its registry
pub trait AudienceManager: Send + Sync {
    /// Offer an actor to every declared child of `parent`
    fn add_actor_to_children(&self, actor: ActorId, parent: &GroupRef);

    /// Withdraw an actor from every declared child of `parent`
    fn remove_actor_from_children(&self, actor: ActorId, parent: &GroupRef);

    /// Resolve a live display by id
    fn lookup(&self, group: &GroupId) -> Option<Arc<dyn Audience>>;

    /// Every live single filter of a kind, in declaration order
    fn find_displays_of_kind(&self, kind: &DisplayKind) -> Vec<Arc<dyn Audience>>;

    /// Reentrant lock serializing all work for one actor
    fn actor_lock(&self, actor: ActorId) -> ActorLock;

    fn events(&self) -> &EventBus;

    fn metrics(&self) -> &AudienceMetrics;

    /// Owner records of a display kind
    fn ownership(&self, kind: &DisplayKind) -> Option<Arc<OwnershipTable>>;
}
