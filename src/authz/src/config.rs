//! Engine configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::CODE_VERSION;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub directory: DirectorySection,
}

/// Slot names and schema gate
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSection {
    /// Schema version the store must report
    #[serde(default = "default_schema_version")]
    pub expected_schema_version: String,

    /// Slot holding the rule source
    #[serde(default = "default_rule_slot")]
    pub rule_slot: String,

    /// Slot holding the compiled table
    #[serde(default = "default_cache_slot")]
    pub cache_slot: String,

    /// Slot holding the store's schema version
    #[serde(default = "default_version_slot")]
    pub version_slot: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSection {
    /// sled database directory
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectorySection {
    /// TOML file with tags and accounts
    #[serde(default = "default_directory_path")]
    pub path: PathBuf,
}

fn default_schema_version() -> String { CODE_VERSION.to_string() }
fn default_rule_slot() -> String { "RackCode".to_string() }
fn default_cache_slot() -> String { "RackCodeCache".to_string() }
fn default_version_slot() -> String { "DB_VERSION".to_string() }
fn default_storage_path() -> PathBuf { PathBuf::from("./data/racktag") }
fn default_directory_path() -> PathBuf { PathBuf::from("./directory.toml") }

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            expected_schema_version: default_schema_version(),
            rule_slot: default_rule_slot(),
            cache_slot: default_cache_slot(),
            version_slot: default_version_slot(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self { path: default_directory_path() }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;

        let config: EngineConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if engine.expected_schema_version.trim().is_empty() {
            anyhow::bail!("Expected schema version must not be empty");
        }

        let slots = [&engine.rule_slot, &engine.cache_slot, &engine.version_slot];
        if slots.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("Slot names must not be empty");
        }
        if engine.rule_slot == engine.cache_slot
            || engine.rule_slot == engine.version_slot
            || engine.cache_slot == engine.version_slot
        {
            anyhow::bail!("Rule, cache and version slots must be distinct");
        }

        Ok(())
    }
}
