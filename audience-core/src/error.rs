//! Error types for the audience engine
//!
//! Membership operations themselves never fail: stale references and
//! duplicate work are absorbed as no-ops. Errors surface only while
//! building a registry and from collaborator policies.

use audience_types::{ActorId, GroupId};
use thiserror::Error;

/// Failure reported by a pluggable policy
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PolicyError(pub String);

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Audience engine errors
#[derive(Debug, Error)]
pub enum AudienceError {
    #[error("Group {0} is declared more than once")]
    DuplicateGroup(GroupId),

    #[error("Group {0} not found")]
    UnknownGroup(GroupId),

    #[error("Group {parent} declares unknown child {child}")]
    UnknownChild { parent: GroupId, child: GroupId },

    #[error("Group {0} is part of a child cycle")]
    Cycle(GroupId),

    #[error("Single group {0} cannot be inverted")]
    InvertedSingle(GroupId),

    #[error("Group {group} uses unknown policy {policy}")]
    UnknownPolicy { group: GroupId, policy: String },

    #[error("Policy of group {group} failed for actor {actor}: {source}")]
    Policy {
        group: GroupId,
        actor: ActorId,
        #[source]
        source: PolicyError,
    },
}

/// Result type for audience operations
pub type Result<T> = std::result::Result<T, AudienceError>;
