//! Exclusive single-owner displays
//!
//! Sibling single filters of the same display kind compete for each actor.
//! Per (actor, kind) there is at most one [`PlayerSingleDisplay`], the owner
//! record, whose `current` names the winning group. A single filter lets an
//! actor through only while it is that actor's current owner.
//!
//! Arbitration:
//! - a strictly higher priority takes over from the incumbent
//! - an equal priority keeps the incumbent
//! - when the owner stops considering the actor, the highest-priority
//!   sibling that still considers it takes over (earliest declared on ties)
//! - with no such sibling the record is disposed and dropped from its table

use crate::display::{Audience, DisplayBase};
use crate::error::PolicyError;
use crate::filter::{AudienceFilter, FilterPolicy};
use crate::manager::AudienceManager;
use audience_types::{ActorId, AudienceEvent, DisplayKind, DisplayState, GroupId, GroupRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-actor renderer driven by an owner record
pub trait SingleSession: Send + Sync {
    /// The actor is now shown `owner`'s content
    fn on_setup(&self, _actor: ActorId, _owner: &GroupRef) {}

    /// `owner` stops being shown to the actor
    fn on_tear_down(&self, _actor: ActorId, _owner: &GroupRef) {}

    fn tick(&self, _actor: ActorId, _owner: &GroupRef) {}

    /// The owner record is gone
    fn on_dispose(&self, _actor: ActorId) {}
}

/// Creates one session per owner record
pub trait SessionFactory: Send + Sync {
    /// Called while the table entry for `actor` is being created; must not
    /// touch the ownership table itself.
    fn create(&self, actor: ActorId, kind: &DisplayKind) -> Box<dyn SingleSession>;
}

/// Sessions that render nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessions;

struct NoopSession;

impl SingleSession for NoopSession {}

impl SessionFactory for NoopSessions {
    fn create(&self, _actor: ActorId, _kind: &DisplayKind) -> Box<dyn SingleSession> {
        Box::new(NoopSession)
    }
}

/// Owner record for one (actor, kind) pair
pub struct PlayerSingleDisplay {
    actor: ActorId,
    kind: DisplayKind,
    current: Mutex<GroupRef>,
    session: Box<dyn SingleSession>,
    disposed: AtomicBool,
}

impl PlayerSingleDisplay {
    pub fn new(
        actor: ActorId,
        kind: DisplayKind,
        owner: GroupRef,
        session: Box<dyn SingleSession>,
    ) -> Self {
        Self {
            actor,
            kind,
            current: Mutex::new(owner),
            session,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn kind(&self) -> &DisplayKind {
        &self.kind
    }

    /// The group currently owning the actor
    pub fn current(&self) -> GroupRef {
        self.current.lock().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn initialize(&self, ctx: &dyn AudienceManager) {
        self.setup(ctx);
    }

    /// Let the actor through the current owner's filter
    pub fn setup(&self, ctx: &dyn AudienceManager) {
        let owner = self.current();
        if !self.apply_owner_filter(ctx, &owner, true) {
            return;
        }
        self.session.on_setup(self.actor, &owner);
    }

    /// Take the actor out of the current owner's filter
    pub fn tear_down(&self, ctx: &dyn AudienceManager) {
        let owner = self.current();
        if !self.apply_owner_filter(ctx, &owner, false) {
            return;
        }
        self.session.on_tear_down(self.actor, &owner);
    }

    /// Tear down and mark disposed. A second call is a no-op.
    pub fn dispose(&self, ctx: &dyn AudienceManager) -> bool {
        let lock = ctx.actor_lock(self.actor);
        let _guard = lock.lock();

        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tear_down(ctx);
        self.session.on_dispose(self.actor);
        ctx.metrics().record_owner_disposed();
        debug!(actor = %self.actor, kind = %self.kind, "owner record disposed");
        true
    }

    pub fn tick(&self, ctx: &dyn AudienceManager) {
        let lock = ctx.actor_lock(self.actor);
        let _guard = lock.lock();

        if self.is_disposed() {
            return;
        }
        self.session.tick(self.actor, &self.current());
    }

    /// A sibling started considering the actor.
    ///
    /// Returns true if `candidate` took over.
    pub fn on_added_by(&self, ctx: &dyn AudienceManager, candidate: &GroupRef) -> bool {
        let lock = ctx.actor_lock(self.actor);
        let _guard = lock.lock();

        let current = self.current();
        if *candidate == current || candidate.priority <= current.priority {
            return false;
        }
        self.transfer(ctx, candidate.clone());
        true
    }

    /// A sibling stopped considering the actor.
    ///
    /// Returns true if the record has no owner left and should be disposed.
    pub fn on_removed_by(&self, ctx: &dyn AudienceManager, candidate: &GroupRef) -> bool {
        let lock = ctx.actor_lock(self.actor);
        let _guard = lock.lock();

        if *candidate != self.current() {
            return false;
        }
        match self.elect(ctx) {
            Some(successor) => {
                self.transfer(ctx, successor);
                false
            }
            None => true,
        }
    }

    fn transfer(&self, ctx: &dyn AudienceManager, next: GroupRef) {
        self.tear_down(ctx);
        let previous = std::mem::replace(&mut *self.current.lock(), next.clone());
        self.setup(ctx);
        ctx.metrics().record_transfer();
        debug!(
            actor = %self.actor,
            kind = %self.kind,
            from = %previous,
            to = %next,
            "ownership transferred"
        );
    }

    /// Highest-priority sibling still considering the actor
    fn elect(&self, ctx: &dyn AudienceManager) -> Option<GroupRef> {
        let mut best: Option<GroupRef> = None;
        for audience in ctx.find_displays_of_kind(&self.kind) {
            let Some(filter) = audience.as_filter() else {
                continue;
            };
            if !filter.can_consider(self.actor) {
                continue;
            }
            let group = audience.group();
            if best.as_ref().map_or(true, |b| group.priority > b.priority) {
                best = Some(group.clone());
            }
        }
        best
    }

    /// Returns false if the owner's group no longer resolves to a filter
    fn apply_owner_filter(&self, ctx: &dyn AudienceManager, owner: &GroupRef, allow: bool) -> bool {
        let Some(audience) = ctx.lookup(&owner.id) else {
            warn!(actor = %self.actor, owner = %owner, "owner group is not live");
            return false;
        };
        let Some(filter) = audience.as_filter() else {
            warn!(actor = %self.actor, owner = %owner, "owner group is not a filter");
            return false;
        };
        filter.update_filter(ctx, self.actor, allow);
        true
    }
}

impl fmt::Debug for PlayerSingleDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSingleDisplay")
            .field("actor", &self.actor)
            .field("kind", &self.kind)
            .field("current", &self.current())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Owner records of one display kind, keyed by actor
pub struct OwnershipTable {
    kind: DisplayKind,
    factory: Arc<dyn SessionFactory>,
    displays: DashMap<ActorId, Arc<PlayerSingleDisplay>>,
}

impl OwnershipTable {
    pub fn new(kind: DisplayKind, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            kind,
            factory,
            displays: DashMap::new(),
        }
    }

    pub fn kind(&self) -> &DisplayKind {
        &self.kind
    }

    pub fn get(&self, actor: ActorId) -> Option<Arc<PlayerSingleDisplay>> {
        self.displays.get(&actor).map(|entry| entry.value().clone())
    }

    pub fn owner_of(&self, actor: ActorId) -> Option<GroupRef> {
        self.displays.get(&actor).map(|entry| entry.value().current())
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.displays.contains_key(&actor)
    }

    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }

    /// Records currently owned by a group
    pub fn owned_by(&self, group: &GroupId) -> Vec<Arc<PlayerSingleDisplay>> {
        self.snapshot()
            .into_iter()
            .filter(|display| &display.current().id == group)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<PlayerSingleDisplay>> {
        self.displays.iter().map(|entry| entry.value().clone()).collect()
    }

    /// `group` started considering the actor.
    ///
    /// Creates the record if absent, otherwise arbitrates. Returns true if
    /// `group` owns the actor afterwards.
    pub fn claim(&self, ctx: &dyn AudienceManager, actor: ActorId, group: &GroupRef) -> bool {
        let (display, created) = match self.displays.entry(actor) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let session = self.factory.create(actor, &self.kind);
                let display = Arc::new(PlayerSingleDisplay::new(
                    actor,
                    self.kind.clone(),
                    group.clone(),
                    session,
                ));
                entry.insert(display.clone());
                (display, true)
            }
        };

        if created {
            ctx.metrics().record_owner_created();
            trace!(actor = %actor, kind = %self.kind, owner = %group, "owner record created");
            display.initialize(ctx);
            return true;
        }
        display.on_added_by(ctx, group);
        display.current() == *group
    }

    /// `group` stopped considering the actor.
    ///
    /// Returns true if the record was disposed.
    pub fn release(&self, ctx: &dyn AudienceManager, actor: ActorId, group: &GroupRef) -> bool {
        let Some(display) = self.get(actor) else {
            return false;
        };
        if !display.on_removed_by(ctx, group) {
            return false;
        }
        self.evict_record(ctx, actor, &display)
    }

    /// Dispose and drop the actor's record regardless of its owner
    pub fn evict(&self, ctx: &dyn AudienceManager, actor: ActorId) -> bool {
        match self.get(actor) {
            Some(display) => self.evict_record(ctx, actor, &display),
            None => false,
        }
    }

    /// Dispose every record
    pub fn clear(&self, ctx: &dyn AudienceManager) {
        for display in self.snapshot() {
            self.evict_record(ctx, display.actor(), &display);
        }
    }

    fn evict_record(
        &self,
        ctx: &dyn AudienceManager,
        actor: ActorId,
        display: &Arc<PlayerSingleDisplay>,
    ) -> bool {
        let removed = self
            .displays
            .remove_if(&actor, |_, current| Arc::ptr_eq(current, display))
            .is_some();
        if removed {
            display.dispose(ctx);
        }
        removed
    }
}

impl fmt::Debug for OwnershipTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipTable")
            .field("kind", &self.kind)
            .field("displays", &self.displays.len())
            .finish_non_exhaustive()
    }
}

/// Passes exactly the actors a single filter currently owns
pub struct OwnershipPolicy {
    table: Arc<OwnershipTable>,
    group: GroupId,
}

impl OwnershipPolicy {
    pub fn new(table: Arc<OwnershipTable>, group: GroupId) -> Self {
        Self { table, group }
    }
}

impl FilterPolicy for OwnershipPolicy {
    fn evaluate(&self, actor: ActorId) -> Result<bool, PolicyError> {
        Ok(self
            .table
            .owner_of(actor)
            .is_some_and(|owner| owner.id == self.group))
    }

    fn watches(&self, _topic: &str) -> bool {
        false
    }
}

/// Filter competing with its siblings for exclusive ownership of a display kind
pub struct SingleFilter {
    filter: AudienceFilter,
    table: Arc<OwnershipTable>,
}

impl SingleFilter {
    /// Ownership decides membership, so the filter is never inverted
    pub fn new(group: GroupRef, table: Arc<OwnershipTable>, children: Vec<GroupId>) -> Self {
        let policy = Arc::new(OwnershipPolicy::new(table.clone(), group.id.clone()));
        Self {
            filter: AudienceFilter::fixed(group, policy, children),
            table,
        }
    }

    pub fn kind(&self) -> &DisplayKind {
        self.table.kind()
    }

    pub fn table(&self) -> &Arc<OwnershipTable> {
        &self.table
    }
}

impl fmt::Debug for SingleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFilter")
            .field("kind", self.kind())
            .field("filter", &self.filter)
            .finish()
    }
}

impl Audience for SingleFilter {
    fn base(&self) -> &DisplayBase {
        self.filter.base()
    }

    fn on_actor_add(&self, ctx: &dyn AudienceManager, actor: ActorId) {
        self.table.claim(ctx, actor, self.group());
        self.filter.on_actor_add(ctx, actor);
    }

    fn on_actor_remove(&self, ctx: &dyn AudienceManager, actor: ActorId) {
        self.filter.on_actor_remove(ctx, actor);
        self.table.release(ctx, actor, self.group());
    }

    fn handle_event(&self, ctx: &dyn AudienceManager, event: &AudienceEvent) {
        self.filter.handle_event(ctx, event);
    }

    /// Ticks the owner records this filter currently holds
    fn tick(&self, ctx: &dyn AudienceManager) {
        for display in self.table.owned_by(&self.group().id) {
            display.tick(ctx);
        }
    }

    fn as_filter(&self) -> Option<&AudienceFilter> {
        Some(&self.filter)
    }

    fn display_kind(&self) -> Option<&DisplayKind> {
        Some(self.kind())
    }

    fn contains(&self, actor: ActorId) -> bool {
        self.filter.contains(actor)
    }

    fn display_state(&self, actor: ActorId) -> DisplayState {
        self.filter.display_state(actor)
    }
}
