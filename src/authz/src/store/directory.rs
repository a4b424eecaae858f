//! Tag and account directory loaded from TOML
//!
//! ```toml
//! [[tags]]
//! id = 1
//! name = "location"
//!
//! [[tags]]
//! id = 2
//! name = "dc-east"
//! parent_id = 1
//!
//! [[accounts]]
//! user_id = 1
//! username = "admin"
//! tags = ["dc-east"]
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{AccountStore, TagStore};
use crate::error::Result;
use crate::tags::{Tag, TagId};
use crate::types::Identity;

/// Account entry: identity plus explicit tags by name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountEntry {
    pub user_id: u32,
    pub username: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Static tag and account directory
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Directory {
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl Directory {
    /// Load and validate a directory file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read directory file {}", path.as_ref().display()))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate directory TOML
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let directory: Directory =
            toml::from_str(contents).context("Failed to parse directory file")?;
        directory.validate()?;
        Ok(directory)
    }

    /// Every account tag must name a known tag and user ids must be unique.
    /// Tag names may not start with `$`.
    pub fn validate(&self) -> anyhow::Result<()> {
        for tag in &self.tags {
            tag.check_name()?;
        }
        let names: HashMap<&str, TagId> =
            self.tags.iter().map(|t| (t.name.as_str(), t.id)).collect();

        let mut seen = HashMap::new();
        for account in &self.accounts {
            if let Some(other) = seen.insert(account.user_id, &account.username) {
                anyhow::bail!(
                    "User id {} assigned to both `{}` and `{}`",
                    account.user_id,
                    other,
                    account.username
                );
            }
            for tag in &account.tags {
                if !names.contains_key(tag.as_str()) {
                    anyhow::bail!(
                        "Account `{}` references unknown tag `{}`",
                        account.username,
                        tag
                    );
                }
            }
        }
        Ok(())
    }

    /// Identity of an account by login name
    pub fn account(&self, username: &str) -> Option<Identity> {
        self.accounts
            .iter()
            .find(|a| a.username == username)
            .map(|a| Identity::new(a.user_id, a.username.clone()))
    }

    /// Tag id by name
    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.tags.iter().find(|t| t.name == name).map(|t| t.id)
    }
}

impl TagStore for Directory {
    fn all_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.tags.clone())
    }
}

impl AccountStore for Directory {
    fn explicit_tags(&self, identity: &Identity) -> Result<Vec<TagId>> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.user_id == identity.user_id)
            .map(|a| a.tags.iter().filter_map(|name| self.tag_id(name)).collect())
            .unwrap_or_default())
    }
}
