//! Event bus between the host and active displays
//!
//! Displays subscribe when they activate and unsubscribe when they drain,
//! so host events only reach groups that currently have actors. Dispatch
//! works on a snapshot of the subscribers, which lets handlers activate or
//! release displays while an event is being delivered.

use audience_types::{AudienceEvent, GroupId};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscription registry keyed by group
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: DashMap<SubscriptionId, GroupId>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a group to host events
    pub fn subscribe(&self, group: GroupId) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, group);
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Groups subscribed right now, ordered by subscription age
    pub fn subscribers(&self) -> Vec<GroupId> {
        let mut subs: Vec<_> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        subs.sort_by_key(|(id, _)| *id);
        subs.into_iter().map(|(_, group)| group).collect()
    }

    pub fn is_subscribed(&self, group: &GroupId) -> bool {
        self.subscribers.iter().any(|entry| entry.value() == group)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&self) {
        self.subscribers.clear();
    }
}

/// Predicate topic carried by an event, if any
pub fn event_topic(event: &AudienceEvent) -> Option<&str> {
    match event {
        AudienceEvent::Changed { topic, .. } => Some(topic),
        AudienceEvent::Connected { .. } | AudienceEvent::Disconnected { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_types::ActorId;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let a = bus.subscribe(GroupId::from("a"));
        let b = bus.subscribe(GroupId::from("b"));

        assert_eq!(bus.subscribers(), vec![GroupId::from("a"), GroupId::from("b")]);
        assert!(bus.is_subscribed(&GroupId::from("a")));

        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.subscribers(), vec![GroupId::from("b")]);

        assert!(bus.unsubscribe(b));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_event_topic() {
        let actor = ActorId::from_name("alice");
        let changed = AudienceEvent::Changed {
            actor,
            topic: "tags".to_string(),
        };
        assert_eq!(event_topic(&changed), Some("tags"));
        assert_eq!(event_topic(&AudienceEvent::Connected { actor }), None);
    }
}
