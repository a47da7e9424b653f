//! CLI command implementations.

pub mod check;
pub mod simulate;

pub use check::check_manifest;
pub use simulate::simulate;

use crate::config::CliConfig;
use crate::demo::{catalog_for, TagStore};
use anyhow::{Context, Result};
use audience_core::{AudienceRegistry, Manifest, RegistryBuilder};
use std::sync::Arc;

/// Load the configured manifest and build a registry over the demo policies
pub fn load_registry(config: &CliConfig, store: &Arc<TagStore>) -> Result<AudienceRegistry> {
    let path = config.manifest_path()?;
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest: Manifest = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))?;

    let catalog = catalog_for(&manifest, store);
    RegistryBuilder::new()
        .manifest(manifest)
        .catalog(catalog)
        .config(config.registry)
        .build()
        .context("Invalid manifest")
}
