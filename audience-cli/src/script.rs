//! Scenario scripts for `audience simulate`.
//!
//! ```yaml
//! steps:
//!   - connect: alice
//!   - tag: { actor: alice, tag: staff }
//!   - invert: { group: staff }
//!   - tick: 3
//!   - disconnect: alice
//! ```

use audience_core::GroupId;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Connect(String),
    Disconnect(String),
    /// Add a tag and announce the change
    Tag { actor: String, tag: String },
    /// Remove a tag and announce the change
    Untag { actor: String, tag: String },
    Invert {
        group: GroupId,
        #[serde(default = "default_true")]
        inverted: bool,
    },
    /// Run this many ticks in place
    Tick(u32),
    /// Re-evaluate every filter for one actor
    Refresh(String),
}

fn default_true() -> bool {
    true
}

impl Step {
    /// Actor named by this step, if any
    pub fn actor(&self) -> Option<&str> {
        match self {
            Step::Connect(actor)
            | Step::Disconnect(actor)
            | Step::Refresh(actor)
            | Step::Tag { actor, .. }
            | Step::Untag { actor, .. } => Some(actor.as_str()),
            Step::Invert { .. } | Step::Tick(_) => None,
        }
    }
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Every actor mentioned, in order of first mention
    pub fn actors(&self) -> Vec<String> {
        let mut actors: Vec<String> = Vec::new();
        for actor in self.steps.iter().filter_map(Step::actor) {
            if !actors.iter().any(|known| known == actor) {
                actors.push(actor.to_string());
            }
        }
        actors
    }
}
