//! Storage collaborators
//!
//! The engine never talks to a database directly. It reads and writes named
//! text slots through [`ScriptStore`], reads the flat tag list through
//! [`TagStore`] and resolves explicit account tags through [`AccountStore`].
//! Every failure is reported as [`AuthzError::StorageUnavailable`].
//!
//! [`AuthzError::StorageUnavailable`]: crate::error::AuthzError::StorageUnavailable

pub mod directory;
pub mod memory;
pub mod persistent;

pub use directory::Directory;
pub use memory::MemoryStore;
pub use persistent::SledScriptStore;

use crate::error::Result;
use crate::tags::{Tag, TagId};
use crate::types::Identity;

/// Named text slots (rule source, compiled cache, schema version)
pub trait ScriptStore: Send + Sync {
    /// Read a slot; `None` if it was never written
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Overwrite a slot
    fn set(&self, name: &str, text: &str) -> Result<()>;
}

/// Source of the flat tag list
pub trait TagStore: Send + Sync {
    /// Every tag, in no particular order
    fn all_tags(&self) -> Result<Vec<Tag>>;
}

/// Explicit tags assigned to user accounts
pub trait AccountStore: Send + Sync {
    /// Tags directly assigned to the account (empty if none)
    fn explicit_tags(&self, identity: &Identity) -> Result<Vec<TagId>>;
}
