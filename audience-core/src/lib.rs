//! Audience Membership Engine
//!
//! This crate decides, for every connected actor, which groups it belongs
//! to. Groups form a tree: root groups see every actor, filters forward
//! only the actors that pass their policy to their children, and single
//! filters compete with their siblings so that each actor is owned by at
//! most one of them per display kind.
//!
//! # Architecture
//!
//! ```text
//! connect → roots → filter.refresh → children.add_actor → … → single.claim
//! ```
//!
//! - **Displays** hold a membership set and activate on their first actor
//! - **Filters** split their considered set into passed and blocked actors
//! - **Single filters** arbitrate ownership by priority through a shared
//!   ownership table
//! - **The registry** owns every display and resolves cross-group references
//!   by id
//!
//! ## Concurrency
//!
//! All work for one actor runs under that actor's reentrant lock, so the
//! whole fan-out of a connect, refresh or disconnect is serialized per
//! actor while different actors proceed in parallel.
//!
//! # Example
//!
//! ```rust
//! use audience_core::prelude::*;
//!
//! let manifest = Manifest::new(vec![
//!     GroupDefinition::filter("everyone", None, &["sidebar"]),
//!     GroupDefinition::single("sidebar", "sidebar", 1),
//! ]);
//! let registry = AudienceRegistry::from_manifest(&manifest, PolicyCatalog::new()).unwrap();
//!
//! let alice = ActorId::from_name("alice");
//! registry.on_actor_connect(alice);
//! assert!(registry.has_single_display(alice, &DisplayKind::from("sidebar")));
//! ```

#![warn(missing_debug_implementations)]

pub mod display;
pub mod error;
pub mod events;
pub mod filter;
pub mod locks;
pub mod manager;
pub mod membership;
pub mod metrics;
pub mod registry;
pub mod single;

pub use audience_types::{
    ActorId, AudienceEvent, DisplayKind, DisplayState, GroupDefinition, GroupId, GroupKind,
    GroupRef, Manifest, Priority,
};
pub use display::{Audience, AudienceDisplay, DisplayBase, DisplayHooks, PassThroughHooks};
pub use error::{AudienceError, PolicyError, Result};
pub use events::{EventBus, SubscriptionId};
pub use filter::{AudienceFilter, FilterPolicy, PassThroughPolicy};
pub use locks::{ActorLock, ActorLocks};
pub use manager::AudienceManager;
pub use membership::MembershipSet;
pub use metrics::{AudienceMetrics, MetricsSnapshot};
pub use registry::{AudienceRegistry, PolicyCatalog, RegistryBuilder, RegistryConfig};
pub use single::{
    NoopSessions, OwnershipTable, PlayerSingleDisplay, SessionFactory, SingleFilter, SingleSession,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::display::{Audience, DisplayHooks};
    pub use crate::filter::FilterPolicy;
    pub use crate::manager::AudienceManager;
    pub use crate::registry::{AudienceRegistry, PolicyCatalog, RegistryBuilder, RegistryConfig};
    pub use crate::single::{SessionFactory, SingleSession};
    pub use audience_types::{
        ActorId, AudienceEvent, DisplayKind, DisplayState, GroupDefinition, GroupId, GroupRef,
        Manifest,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_basic_usage() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::display("lobby"))
            .build()
            .unwrap();
        let alice = ActorId::from_name("alice");

        registry.on_actor_connect(alice);
        assert_eq!(
            registry.display_state(&GroupId::from("lobby"), alice),
            Some(DisplayState::InAudience)
        );
    }
}
