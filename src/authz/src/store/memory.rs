//! In-memory store implementing every storage trait

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{AccountStore, ScriptStore, TagStore};
use crate::error::{AuthzError, Result};
use crate::tags::{Tag, TagId};
use crate::types::Identity;

/// Thread-safe in-memory store
///
/// Used by tests and by embedders that keep everything in process. The
/// `unavailable` switch makes every call fail, simulating a lost backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    scripts: DashMap<String, String>,
    tags: RwLock<Vec<Tag>>,
    accounts: DashMap<u32, Vec<TagId>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tag list
    pub fn set_tags(&self, tags: Vec<Tag>) {
        *self.tags.write() = tags;
    }

    /// Assign explicit tags to an account
    pub fn assign(&self, user_id: u32, tags: impl IntoIterator<Item = TagId>) {
        self.accounts.insert(user_id, tags.into_iter().collect());
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthzError::StorageUnavailable(
                "memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScriptStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.scripts.get(name).map(|entry| entry.value().clone()))
    }

    fn set(&self, name: &str, text: &str) -> Result<()> {
        self.check()?;
        self.scripts.insert(name.to_string(), text.to_string());
        Ok(())
    }
}

impl TagStore for MemoryStore {
    fn all_tags(&self) -> Result<Vec<Tag>> {
        self.check()?;
        Ok(self.tags.read().clone())
    }
}

impl AccountStore for MemoryStore {
    fn explicit_tags(&self, identity: &Identity) -> Result<Vec<TagId>> {
        self.check()?;
        Ok(self
            .accounts
            .get(&identity.user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
