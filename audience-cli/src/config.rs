//! Configuration parsing for the audience CLI.

use audience_core::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Settings for the demo policies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Tags every actor starts with, keyed by actor name
    #[serde(default)]
    pub initial_tags: BTreeMap<String, Vec<String>>,
}

/// CLI configuration matching audience.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Group manifest, relative to the config file
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub output: OutputFormat,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub demo: DemoConfig,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_tick_interval_ms() -> u64 {
    50
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            tick_interval_ms: default_tick_interval_ms(),
            output: OutputFormat::default(),
            registry: RegistryConfig::default(),
            demo: DemoConfig::default(),
            config_path: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: CliConfig = serde_yaml::from_str(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Manifest path, resolved relative to the config file
    pub fn manifest_path(&self) -> Result<PathBuf, ConfigError> {
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("manifest".to_string()))?;
        Ok(self.resolve_path(manifest))
    }

    /// Apply command-line overrides on top of file values
    pub fn with_overrides(
        mut self,
        manifest: Option<PathBuf>,
        json: bool,
        tick_interval_ms: Option<u64>,
    ) -> Self {
        if let Some(manifest) = manifest {
            // flags are relative to the working directory, not the config file
            self.manifest = Some(match std::env::current_dir() {
                Ok(cwd) => cwd.join(manifest),
                Err(_) => manifest,
            });
        }
        if json {
            self.output = OutputFormat::Json;
        }
        if let Some(interval) = tick_interval_ms {
            self.tick_interval_ms = interval;
        }
        self
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}
