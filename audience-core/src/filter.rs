//! Audience filters
//!
//! A filter splits the actors it is given (its considered set) into those
//! that pass its policy (the filtered set) and those that don't. Only the
//! filtered set is forwarded to the filter's children. Inversion flips the
//! outcome of the policy without touching the policy itself.

use crate::display::{Audience, DisplayBase};
use crate::error::{AudienceError, PolicyError, Result};
use crate::events::event_topic;
use crate::manager::AudienceManager;
use crate::membership::MembershipSet;
use audience_types::{ActorId, AudienceEvent, DisplayState, GroupId, GroupRef};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Predicate deciding whether a considered actor passes a filter
pub trait FilterPolicy: Send + Sync {
    /// Evaluate the predicate for one actor
    fn evaluate(&self, actor: ActorId) -> std::result::Result<bool, PolicyError>;

    /// The actor entered the filtered set
    fn on_filter_added(&self, _group: &GroupRef, _actor: ActorId) {}

    /// The actor left the filtered set
    fn on_filter_removed(&self, _group: &GroupRef, _actor: ActorId) {}

    /// Whether a change on `topic` can affect this predicate
    fn watches(&self, _topic: &str) -> bool {
        true
    }
}

/// Policy that lets every considered actor through
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughPolicy;

impl FilterPolicy for PassThroughPolicy {
    fn evaluate(&self, _actor: ActorId) -> std::result::Result<bool, PolicyError> {
        Ok(true)
    }

    fn watches(&self, _topic: &str) -> bool {
        false
    }
}

/// A display whose members are gated by a [`FilterPolicy`]
pub struct AudienceFilter {
    base: DisplayBase,
    filtered: MembershipSet,
    inverted: AtomicBool,
    /// False for filters whose outcome is an ownership decision
    invertible: bool,
    children: Vec<GroupId>,
    policy: Arc<dyn FilterPolicy>,
}

impl AudienceFilter {
    pub fn new(
        group: GroupRef,
        policy: Arc<dyn FilterPolicy>,
        children: Vec<GroupId>,
        inverted: bool,
    ) -> Self {
        Self {
            base: DisplayBase::new(group),
            filtered: MembershipSet::new(),
            inverted: AtomicBool::new(inverted),
            invertible: true,
            children,
            policy,
        }
    }

    /// Filter that can never be inverted
    pub(crate) fn fixed(
        group: GroupRef,
        policy: Arc<dyn FilterPolicy>,
        children: Vec<GroupId>,
    ) -> Self {
        Self {
            invertible: false,
            ..Self::new(group, policy, children, false)
        }
    }

    pub fn pass_through(group: GroupRef, children: Vec<GroupId>) -> Self {
        Self::new(group, Arc::new(PassThroughPolicy), children, false)
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    pub fn filtered(&self) -> &MembershipSet {
        &self.filtered
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted.load(Ordering::Acquire)
    }

    pub fn is_invertible(&self) -> bool {
        self.invertible
    }

    /// Whether the actor is in the considered set
    pub fn can_consider(&self, actor: ActorId) -> bool {
        self.base.members().contains(actor)
    }

    /// Apply a predicate outcome to the filtered set.
    ///
    /// The actor is let through iff `is_filtered` differs from the inversion
    /// flag and the actor is considered. Returns true if the filtered set
    /// changed, in which case the children were notified.
    pub fn update_filter(
        &self,
        ctx: &dyn AudienceManager,
        actor: ActorId,
        is_filtered: bool,
    ) -> bool {
        let lock = ctx.actor_lock(actor);
        let _guard = lock.lock();

        let group = self.base.group();
        let allow = (is_filtered != self.is_inverted()) && self.can_consider(actor);
        if allow {
            if !self.filtered.insert(actor).inserted {
                return false;
            }
            ctx.metrics().record_filter_flip();
            debug!(group = %group.id, actor = %actor, "actor let through");
            self.policy.on_filter_added(group, actor);
            ctx.add_actor_to_children(actor, group);
        } else {
            if !self.filtered.remove(actor).removed {
                return false;
            }
            ctx.metrics().record_filter_flip();
            debug!(group = %group.id, actor = %actor, "actor filtered out");
            self.policy.on_filter_removed(group, actor);
            ctx.remove_actor_from_children(actor, group);
        }
        true
    }

    /// Re-evaluate the policy for one actor, surfacing policy failures.
    ///
    /// Actors outside the considered set are only cleared from the filtered
    /// set; the policy is not consulted for them. An actor this filter has
    /// never seen returns without taking its lock.
    pub fn try_refresh(&self, ctx: &dyn AudienceManager, actor: ActorId) -> Result<bool> {
        ctx.metrics().record_refresh();
        if !self.can_consider(actor) && !self.filtered.contains(actor) {
            return Ok(false);
        }

        let lock = ctx.actor_lock(actor);
        let _guard = lock.lock();

        if !self.can_consider(actor) {
            return Ok(self.update_filter(ctx, actor, false));
        }
        let is_filtered = self
            .policy
            .evaluate(actor)
            .map_err(|source| AudienceError::Policy {
                group: self.base.group().id.clone(),
                actor,
                source,
            })?;
        Ok(self.update_filter(ctx, actor, is_filtered))
    }

    /// Re-evaluate the policy for one actor.
    ///
    /// A failing policy leaves the actor where it was.
    pub fn refresh(&self, ctx: &dyn AudienceManager, actor: ActorId) -> bool {
        match self.try_refresh(ctx, actor) {
            Ok(changed) => changed,
            Err(err) => {
                ctx.metrics().record_policy_failure();
                warn!(error = %err, "filter refresh failed, keeping current state");
                false
            }
        }
    }

    /// Flip the inversion flag and refresh every considered actor.
    ///
    /// Returns false if the flag already had this value or the filter is
    /// not invertible.
    pub fn set_inverted(&self, ctx: &dyn AudienceManager, inverted: bool) -> bool {
        if !self.invertible {
            debug!(group = %self.base.group().id, "filter cannot be inverted");
            return false;
        }
        if self.inverted.swap(inverted, Ordering::AcqRel) == inverted {
            return false;
        }
        debug!(group = %self.base.group().id, inverted, "filter inversion changed");
        for actor in self.base.members().snapshot() {
            self.refresh(ctx, actor);
        }
        true
    }
}

impl fmt::Debug for AudienceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudienceFilter")
            .field("base", &self.base)
            .field("filtered", &self.filtered)
            .field("inverted", &self.is_inverted())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Audience for AudienceFilter {
    fn base(&self) -> &DisplayBase {
        &self.base
    }

    fn on_actor_add(&self, ctx: &dyn AudienceManager, actor: ActorId) {
        self.refresh(ctx, actor);
    }

    fn on_actor_remove(&self, ctx: &dyn AudienceManager, actor: ActorId) {
        self.update_filter(ctx, actor, false);
    }

    fn handle_event(&self, ctx: &dyn AudienceManager, event: &AudienceEvent) {
        let Some(topic) = event_topic(event) else {
            return;
        };
        let actor = event.actor();
        if self.policy.watches(topic) && self.can_consider(actor) {
            self.refresh(ctx, actor);
        }
    }

    fn as_filter(&self) -> Option<&AudienceFilter> {
        Some(self)
    }

    fn contains(&self, actor: ActorId) -> bool {
        self.filtered.contains(actor)
    }

    fn display_state(&self, actor: ActorId) -> DisplayState {
        if self.filtered.contains(actor) {
            DisplayState::InAudience
        } else if self.can_consider(actor) {
            DisplayState::Blocked
        } else {
            DisplayState::NotConsidered
        }
    }
}
