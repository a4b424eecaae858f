//! Persistent script slots backed by sled

use std::path::Path;

use tracing::debug;

use super::ScriptStore;
use crate::error::{AuthzError, Result};

/// Name of the sled tree holding the slots
const SCRIPTS_TREE: &str = "scripts";

/// Script slot store in a sled database
#[derive(Debug, Clone)]
pub struct SledScriptStore {
    tree: sled::Tree,
}

impl SledScriptStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(&db)
    }

    /// Use an already opened database
    pub fn from_db(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(SCRIPTS_TREE)?;
        Ok(Self { tree })
    }

    /// Temporary database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }
}

impl ScriptStore for SledScriptStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        match self.tree.get(name.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| {
                    AuthzError::StorageUnavailable(format!("slot {name} is not UTF-8: {e}"))
                }),
            None => Ok(None),
        }
    }

    fn set(&self, name: &str, text: &str) -> Result<()> {
        self.tree.insert(name.as_bytes(), text.as_bytes())?;
        self.tree.flush()?;
        debug!(slot = name, bytes = text.len(), "Wrote script slot");
        Ok(())
    }
}
