//! Shared types for the audience engine
//!
//! This crate provides the vocabulary used across the audience workspace:
//! actor and group identifiers, priorities, display kinds, the diagnostic
//! display state, host events, and the manifest that declares groups.

pub mod manifest;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use manifest::{GroupDefinition, GroupKind, Manifest};

/// Namespace used to derive stable actor ids from names
const ACTOR_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_4c3e_9b2d_4e8a_b7c5_1d0e_2f3a_4b5c);

/// Identifier of a connected actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// A fresh random id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for a human-readable name
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&ACTOR_NAMESPACE, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ActorId {
    fn from(id: Uuid) -> Self {
        ActorId(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier, unique within a manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        GroupId(id.to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arbitration priority. Higher wins, ties favor the incumbent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Priority(pub i32);

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable reference to one group definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: GroupId,
    pub priority: Priority,
}

impl GroupRef {
    pub fn new(id: impl Into<String>, priority: impl Into<Priority>) -> Self {
        Self {
            id: GroupId::new(id),
            priority: priority.into(),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.priority)
    }
}

/// Kind of display that sibling single filters compete for (e.g. "sidebar")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayKind(pub String);

impl DisplayKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DisplayKind {
    fn from(kind: &str) -> Self {
        DisplayKind(kind.to_string())
    }
}

impl fmt::Display for DisplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an actor stands relative to one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    /// The actor is in the audience
    InAudience,

    /// The actor is considered but does not pass the filter
    Blocked,

    /// No parent passes the actor down to this group
    NotConsidered,
}

impl DisplayState {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayState::InAudience => "In Audience",
            DisplayState::Blocked => "Blocked",
            DisplayState::NotConsidered => "Not Considered",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            DisplayState::InAudience => "green",
            DisplayState::Blocked => "red",
            DisplayState::NotConsidered => "gray",
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Host event routed to active displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudienceEvent {
    /// An actor connected
    Connected { actor: ActorId },

    /// An actor disconnected
    Disconnected { actor: ActorId },

    /// Something a filter predicate may depend on changed for an actor
    Changed { actor: ActorId, topic: String },
}

impl AudienceEvent {
    pub fn actor(&self) -> ActorId {
        match self {
            AudienceEvent::Connected { actor }
            | AudienceEvent::Disconnected { actor }
            | AudienceEvent::Changed { actor, .. } => *actor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_from_name_is_stable() {
        assert_eq!(ActorId::from_name("alice"), ActorId::from_name("alice"));
        assert_ne!(ActorId::from_name("alice"), ActorId::from_name("bob"));
    }

    #[test]
    fn test_group_ref_display() {
        let group = GroupRef::new("sidebar-main", 5);
        assert_eq!(group.to_string(), "sidebar-main@5");
        assert_eq!(group.id.as_str(), "sidebar-main");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority(1) < Priority(5));
        assert_eq!(Priority::default(), Priority(0));
    }

    #[test]
    fn test_display_state_labels() {
        assert_eq!(DisplayState::InAudience.label(), "In Audience");
        assert_eq!(DisplayState::Blocked.color(), "red");
        assert_eq!(DisplayState::NotConsidered.to_string(), "Not Considered");
    }

    #[test]
    fn test_display_state_serializes_snake_case() {
        let json = serde_json::to_string(&DisplayState::NotConsidered).unwrap();
        assert_eq!(json, "\"not_considered\"");
    }

    #[test]
    fn test_event_actor() {
        let actor = ActorId::from_name("carol");
        let event = AudienceEvent::Changed {
            actor,
            topic: "tags".to_string(),
        };
        assert_eq!(event.actor(), actor);
    }
}
