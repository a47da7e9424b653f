//! Validate a manifest and print its group tree.

use super::load_registry;
use crate::config::{CliConfig, OutputFormat};
use crate::demo::TagStore;
use anyhow::Result;
use audience_core::{DisplayKind, GroupId, GroupRef};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct CheckSummary {
    groups: Vec<GroupRef>,
    roots: Vec<GroupId>,
    display_kinds: Vec<DisplayKind>,
    tree: String,
}

pub fn check_manifest(config: &CliConfig) -> Result<()> {
    let store = Arc::new(TagStore::new());
    let registry = load_registry(config, &store)?;

    let summary = CheckSummary {
        groups: registry.groups(),
        roots: registry.roots(),
        display_kinds: registry.display_kinds(),
        tree: registry.render_tree(),
    };

    match config.output {
        OutputFormat::Json => {
            let payload = serde_json::to_string_pretty(&summary)?;
            println!("{}", payload);
        }
        OutputFormat::Text => {
            println!(
                "Manifest OK: {} groups, {} roots, {} display kinds",
                summary.groups.len(),
                summary.roots.len(),
                summary.display_kinds.len()
            );
            println!("{}", summary.tree);
        }
    }

    Ok(())
}
