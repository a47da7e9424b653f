//! Group manifest
//!
//! The manifest is the declarative list of groups a registry is built from.
//! It is plain data: policies are referred to by name and resolved by the
//! registry builder.

use crate::{DisplayKind, GroupId, GroupRef, Priority};
use serde::{Deserialize, Serialize};

/// Declared set of groups, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

impl Manifest {
    pub fn new(groups: Vec<GroupDefinition>) -> Self {
        Self { groups }
    }

    /// Look up a definition by id
    pub fn get(&self, id: &GroupId) -> Option<&GroupDefinition> {
        self.groups.iter().find(|group| &group.id == id)
    }

    /// Ids of every group referenced as a child by some filter
    pub fn child_ids(&self) -> Vec<&GroupId> {
        self.groups
            .iter()
            .flat_map(|group| group.children().iter())
            .collect()
    }
}

/// One group definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub id: GroupId,

    #[serde(default)]
    pub priority: Priority,

    /// Only reachable through a parent filter, never a root
    #[serde(default)]
    pub child_only: bool,

    #[serde(flatten)]
    pub kind: GroupKind,
}

impl GroupDefinition {
    pub fn display(id: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(id),
            priority: Priority::default(),
            child_only: false,
            kind: GroupKind::Display { hooks: None },
        }
    }

    pub fn filter(id: impl Into<String>, policy: Option<&str>, children: &[&str]) -> Self {
        Self {
            id: GroupId::new(id),
            priority: Priority::default(),
            child_only: false,
            kind: GroupKind::Filter {
                policy: policy.map(str::to_string),
                inverted: false,
                children: children.iter().map(|c| GroupId::from(*c)).collect(),
            },
        }
    }

    pub fn single(id: impl Into<String>, display: &str, priority: i32) -> Self {
        Self {
            id: GroupId::new(id),
            priority: Priority(priority),
            child_only: false,
            kind: GroupKind::Single {
                display: DisplayKind::from(display),
                inverted: false,
                children: Vec::new(),
            },
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Priority(priority);
        self
    }

    pub fn with_inverted(mut self, value: bool) -> Self {
        match &mut self.kind {
            GroupKind::Filter { inverted, .. } | GroupKind::Single { inverted, .. } => {
                *inverted = value
            }
            GroupKind::Display { .. } => {}
        }
        self
    }

    pub fn with_children(mut self, ids: &[&str]) -> Self {
        match &mut self.kind {
            GroupKind::Filter { children, .. } | GroupKind::Single { children, .. } => {
                *children = ids.iter().map(|c| GroupId::from(*c)).collect();
            }
            GroupKind::Display { .. } => {}
        }
        self
    }

    /// Name the display hooks of a plain display; ignored for other kinds
    pub fn with_hooks(mut self, name: &str) -> Self {
        if let GroupKind::Display { hooks } = &mut self.kind {
            *hooks = Some(name.to_string());
        }
        self
    }

    pub fn child_only(mut self) -> Self {
        self.child_only = true;
        self
    }

    pub fn group_ref(&self) -> GroupRef {
        GroupRef {
            id: self.id.clone(),
            priority: self.priority,
        }
    }

    /// Declared children; empty for plain displays
    pub fn children(&self) -> &[GroupId] {
        match &self.kind {
            GroupKind::Filter { children, .. } | GroupKind::Single { children, .. } => children,
            GroupKind::Display { .. } => &[],
        }
    }
}

/// What a group does with the actors it is given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupKind {
    /// Plain display; `hooks` names a display policy, none means pass-through
    Display {
        #[serde(default)]
        hooks: Option<String>,
    },

    /// Predicate filter; `policy` names a filter policy, none means pass-through
    Filter {
        #[serde(default)]
        policy: Option<String>,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        children: Vec<GroupId>,
    },

    /// Competes with siblings of the same display kind for exclusive ownership
    Single {
        display: DisplayKind,
        /// Rejected when set; ownership cannot be inverted
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        children: Vec<GroupId>,
    },
}
