//! Configuration for the migrator tool

use anyhow::{Context, Result};
use migrator_manifest::PipelineProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "migrator.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Manifest used when a command is not given one explicitly
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Profile of new manifests seeded from a previous run
    #[serde(default)]
    pub profile: PipelineProfile,

    /// Write indented JSON
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_manifest_path() -> PathBuf {
    migrator_logging::migrator_home()
        .map(|home| home.join("manifest.json"))
        .unwrap_or_else(|_| PathBuf::from("manifest.json"))
}

fn default_pretty() -> bool {
    true
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            profile: PipelineProfile::default(),
            pretty: default_pretty(),
        }
    }
}

impl MigratorConfig {
    /// Load from an explicit file, else `<home>/migrator.toml` if present,
    /// else defaults. An explicit file that does not exist is an error.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = migrator_logging::migrator_home()?.join(CONFIG_FILE);
        if default_path.is_file() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
