//! Audience displays
//!
//! A display is the live instance of one group. It owns the group's
//! membership set and an activation flag: the display activates (and
//! subscribes to host events) when its first actor arrives and releases
//! itself when the set drains.
//!
//! The [`Audience`] trait is the capability interface the rest of the engine
//! sees. Plain displays, filters and single filters all implement it; the
//! lifecycle steps (`add_actor`, `remove_actor`, `initialize`, `dispose`) are
//! provided methods so every implementation follows the same transition
//! rules and only customizes the hooks.

use crate::events::SubscriptionId;
use crate::filter::AudienceFilter;
use crate::manager::AudienceManager;
use crate::membership::MembershipSet;
use audience_types::{ActorId, AudienceEvent, DisplayKind, DisplayState, GroupRef};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Membership and activation state shared by every display
#[derive(Debug)]
pub struct DisplayBase {
    group: GroupRef,
    members: MembershipSet,
    active: AtomicBool,
    /// Held only across activation transitions
    subscription: Mutex<Option<SubscriptionId>>,
}

impl DisplayBase {
    pub fn new(group: GroupRef) -> Self {
        Self {
            group,
            members: MembershipSet::new(),
            active: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &GroupRef {
        &self.group
    }

    pub fn members(&self) -> &MembershipSet {
        &self.members
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark active, subscribe, then run `on_activate` before the
    /// transition lock is dropped. Returns false if already active.
    fn activate(&self, ctx: &dyn AudienceManager, on_activate: impl FnOnce()) -> bool {
        let mut subscription = self.subscription.lock();
        if self.is_active() {
            return false;
        }
        self.active.store(true, Ordering::Release);
        *subscription = Some(ctx.events().subscribe(self.group.id.clone()));
        ctx.metrics().record_activation();
        on_activate();
        true
    }

    /// Clear the active flag, unsubscribe, then run `on_release` before the
    /// transition lock is dropped.
    ///
    /// With `only_if_drained`, the release is skipped when an actor arrived
    /// after the set was observed empty.
    fn release(
        &self,
        ctx: &dyn AudienceManager,
        only_if_drained: bool,
        on_release: impl FnOnce(),
    ) -> bool {
        let mut subscription = self.subscription.lock();
        if !self.is_active() {
            return false;
        }
        if only_if_drained && !self.members.is_empty() {
            return false;
        }
        self.active.store(false, Ordering::Release);
        if let Some(id) = subscription.take() {
            ctx.events().unsubscribe(id);
        }
        ctx.metrics().record_deactivation();
        on_release();
        true
    }
}

/// Live instance of a group
pub trait Audience: Send + Sync + fmt::Debug {
    /// Membership and activation state
    fn base(&self) -> &DisplayBase;

    /// Called after an actor entered the membership set
    fn on_actor_add(&self, ctx: &dyn AudienceManager, actor: ActorId);

    /// Called after an actor left the membership set
    fn on_actor_remove(&self, ctx: &dyn AudienceManager, actor: ActorId);

    /// Called when the display activates. Runs under the activation lock,
    /// so it must not add or remove actors on this display.
    fn on_initialize(&self, _ctx: &dyn AudienceManager) {}

    /// Called when the display is released, under the activation lock
    fn on_dispose(&self, _ctx: &dyn AudienceManager) {}

    /// Host event delivered while the display is active
    fn handle_event(&self, _ctx: &dyn AudienceManager, _event: &AudienceEvent) {}

    /// Fixed-cadence hook
    fn tick(&self, _ctx: &dyn AudienceManager) {}

    /// Filter view of this display, if it filters
    fn as_filter(&self) -> Option<&AudienceFilter> {
        None
    }

    /// Display kind this group competes for, if it is a single filter
    fn display_kind(&self) -> Option<&DisplayKind> {
        None
    }

    fn group(&self) -> &GroupRef {
        self.base().group()
    }

    fn is_active(&self) -> bool {
        self.base().is_active()
    }

    /// Whether the actor is in this group's audience
    fn contains(&self, actor: ActorId) -> bool {
        self.base().members().contains(actor)
    }

    fn display_state(&self, actor: ActorId) -> DisplayState {
        if self.contains(actor) {
            DisplayState::InAudience
        } else {
            DisplayState::NotConsidered
        }
    }

    /// Add an actor. Returns true if the membership changed.
    fn add_actor(&self, ctx: &dyn AudienceManager, actor: ActorId) -> bool {
        let lock = ctx.actor_lock(actor);
        let _guard = lock.lock();

        let insertion = self.base().members().insert(actor);
        if !insertion.inserted {
            return false;
        }
        ctx.metrics().record_add();
        if insertion.was_empty || !self.is_active() {
            self.initialize(ctx);
        }
        debug!(group = %self.group().id, actor = %actor, "actor added");
        self.on_actor_add(ctx, actor);
        true
    }

    /// Remove an actor. Returns true if the membership changed.
    fn remove_actor(&self, ctx: &dyn AudienceManager, actor: ActorId) -> bool {
        let lock = ctx.actor_lock(actor);
        let _guard = lock.lock();

        let removal = self.base().members().remove(actor);
        if !removal.removed {
            return false;
        }
        ctx.metrics().record_remove();
        debug!(group = %self.group().id, actor = %actor, "actor removed");
        self.on_actor_remove(ctx, actor);

        if removal.now_empty {
            self.base().release(ctx, true, || {
                debug!(group = %self.group().id, "display drained");
                self.on_dispose(ctx);
            });
        }
        true
    }

    /// Activate the display. No-op if already active.
    fn initialize(&self, ctx: &dyn AudienceManager) -> bool {
        self.base().activate(ctx, || {
            trace!(group = %self.group().id, "display activated");
            self.on_initialize(ctx);
        })
    }

    /// Release the display, then remove every remaining actor through the
    /// normal removal path. No-op if already released and empty.
    fn dispose(&self, ctx: &dyn AudienceManager) -> bool {
        let released = self.base().release(ctx, false, || {
            debug!(group = %self.group().id, "display disposed");
            self.on_dispose(ctx);
        });
        for actor in self.base().members().snapshot() {
            self.remove_actor(ctx, actor);
        }
        released
    }
}

/// Behavior of a plain display
pub trait DisplayHooks: Send + Sync {
    fn on_actor_add(&self, _group: &GroupRef, _actor: ActorId) {}

    fn on_actor_remove(&self, _group: &GroupRef, _actor: ActorId) {}

    /// Runs under the display's activation lock; must not add or remove
    /// actors on the same display.
    fn on_activate(&self, _group: &GroupRef) {}

    /// Runs under the display's activation lock, like `on_activate`
    fn on_release(&self, _group: &GroupRef) {}

    fn on_event(&self, _group: &GroupRef, _event: &AudienceEvent) {}

    fn tick(&self, _group: &GroupRef, _members: &[ActorId]) {}
}

/// Display hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughHooks;

impl DisplayHooks for PassThroughHooks {}

/// A display that delegates its behavior to [`DisplayHooks`]
pub struct AudienceDisplay {
    base: DisplayBase,
    hooks: Arc<dyn DisplayHooks>,
}

impl AudienceDisplay {
    pub fn new(group: GroupRef, hooks: Arc<dyn DisplayHooks>) -> Self {
        Self {
            base: DisplayBase::new(group),
            hooks,
        }
    }

    pub fn pass_through(group: GroupRef) -> Self {
        Self::new(group, Arc::new(PassThroughHooks))
    }
}

impl fmt::Debug for AudienceDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudienceDisplay")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl Audience for AudienceDisplay {
    fn base(&self) -> &DisplayBase {
        &self.base
    }

    fn on_actor_add(&self, _ctx: &dyn AudienceManager, actor: ActorId) {
        self.hooks.on_actor_add(self.base.group(), actor);
    }

    fn on_actor_remove(&self, _ctx: &dyn AudienceManager, actor: ActorId) {
        self.hooks.on_actor_remove(self.base.group(), actor);
    }

    fn on_initialize(&self, _ctx: &dyn AudienceManager) {
        self.hooks.on_activate(self.base.group());
    }

    fn on_dispose(&self, _ctx: &dyn AudienceManager) {
        self.hooks.on_release(self.base.group());
    }

    fn handle_event(&self, _ctx: &dyn AudienceManager, event: &AudienceEvent) {
        self.hooks.on_event(self.base.group(), event);
    }

    fn tick(&self, _ctx: &dyn AudienceManager) {
        if self.is_active() {
            self.hooks.tick(self.base.group(), &self.base.members().snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AudienceRegistry;
    use audience_types::{GroupDefinition, Manifest};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingHooks {
        added: AtomicUsize,
        removed: AtomicUsize,
        activated: AtomicUsize,
        released: AtomicUsize,
    }

    impl DisplayHooks for CountingHooks {
        fn on_actor_add(&self, _group: &GroupRef, _actor: ActorId) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn on_actor_remove(&self, _group: &GroupRef, _actor: ActorId) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_activate(&self, _group: &GroupRef) {
            self.activated.fetch_add(1, Ordering::SeqCst);
        }

        fn on_release(&self, _group: &GroupRef) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn empty_registry() -> AudienceRegistry {
        AudienceRegistry::from_manifest(&Manifest::default(), Default::default()).unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = empty_registry();
        let hooks = Arc::new(CountingHooks::default());
        let display = AudienceDisplay::new(GroupRef::new("lobby", 0), hooks.clone());
        let alice = ActorId::from_name("alice");

        assert!(display.add_actor(&registry, alice));
        assert!(!display.add_actor(&registry, alice));

        assert!(display.is_active());
        assert_eq!(hooks.added.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.activated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_releases_display() {
        let registry = empty_registry();
        let hooks = Arc::new(CountingHooks::default());
        let display = AudienceDisplay::new(GroupRef::new("lobby", 0), hooks.clone());
        let alice = ActorId::from_name("alice");
        let bob = ActorId::from_name("bob");

        display.add_actor(&registry, alice);
        display.add_actor(&registry, bob);
        assert!(registry.events().is_subscribed(&display.group().id));

        assert!(display.remove_actor(&registry, alice));
        assert!(display.is_active());

        assert!(display.remove_actor(&registry, bob));
        assert!(!display.is_active());
        assert!(!registry.events().is_subscribed(&display.group().id));

        // second removal is a no-op
        assert!(!display.remove_actor(&registry, bob));
        assert_eq!(hooks.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forced_dispose_removes_everyone() {
        let registry = empty_registry();
        let hooks = Arc::new(CountingHooks::default());
        let display = AudienceDisplay::new(GroupRef::new("lobby", 0), hooks.clone());

        for name in ["a", "b", "c"] {
            display.add_actor(&registry, ActorId::from_name(name));
        }

        assert!(display.dispose(&registry));
        assert!(!display.is_active());
        assert!(display.base().members().is_empty());
        assert_eq!(hooks.removed.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.released.load(Ordering::SeqCst), 1);

        // double dispose is a no-op
        assert!(!display.dispose(&registry));
        assert_eq!(hooks.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let registry = empty_registry();
        let display = AudienceDisplay::pass_through(GroupRef::new("lobby", 0));

        assert!(display.initialize(&registry));
        assert!(!display.initialize(&registry));
        assert_eq!(registry.events().len(), 1);
    }

    /// Signals once release has started, then lingers inside it
    #[derive(Default)]
    struct SlowReleaseHooks {
        log: parking_lot::Mutex<Vec<&'static str>>,
        releasing: parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>,
    }

    impl DisplayHooks for SlowReleaseHooks {
        fn on_activate(&self, _group: &GroupRef) {
            self.log.lock().push("activate");
        }

        fn on_release(&self, _group: &GroupRef) {
            if let Some(tx) = self.releasing.lock().take() {
                let _ = tx.send(());
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
            self.log.lock().push("release");
        }
    }

    #[test]
    fn test_reactivation_waits_for_release_hook() {
        let registry = Arc::new(empty_registry());
        let hooks = Arc::new(SlowReleaseHooks::default());
        let display = Arc::new(AudienceDisplay::new(
            GroupRef::new("lobby", 0),
            hooks.clone(),
        ));
        let a = ActorId::from_name("a");
        let b = ActorId::from_name("b");

        let (tx, rx) = std::sync::mpsc::channel();
        *hooks.releasing.lock() = Some(tx);
        assert!(display.add_actor(&*registry, a));

        let remover = {
            let registry = registry.clone();
            let display = display.clone();
            std::thread::spawn(move || display.remove_actor(&*registry, a))
        };

        // the drain is inside on_release; a new arrival must not activate yet
        rx.recv().unwrap();
        assert!(display.add_actor(&*registry, b));
        assert!(remover.join().unwrap());

        assert_eq!(*hooks.log.lock(), vec!["activate", "release", "activate"]);
        assert!(display.is_active());
        assert!(display.contains(b));
        assert!(registry.events().is_subscribed(&display.group().id));
    }

    #[test]
    fn test_forced_dispose_releases_before_removals() {
        let registry = empty_registry();
        let hooks = Arc::new(SlowReleaseHooks::default());
        let display = AudienceDisplay::new(GroupRef::new("lobby", 0), hooks.clone());

        display.add_actor(&registry, ActorId::from_name("a"));
        assert!(display.dispose(&registry));

        assert_eq!(*hooks.log.lock(), vec!["activate", "release"]);
        assert!(!display.is_active());
        assert!(display.base().members().is_empty());
    }

    #[test]
    fn test_display_state_for_plain_display() {
        let registry = AudienceRegistry::from_manifest(
            &Manifest::new(vec![GroupDefinition::display("lobby")]),
            Default::default(),
        )
        .unwrap();
        let display = AudienceDisplay::pass_through(GroupRef::new("other", 0));
        let alice = ActorId::from_name("alice");

        assert_eq!(display.display_state(alice), DisplayState::NotConsidered);
        display.add_actor(&registry, alice);
        assert_eq!(display.display_state(alice), DisplayState::InAudience);
    }
}
