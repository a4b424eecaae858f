//! Tags, tag sets and the tag hierarchy

pub mod tree;

pub use tree::{TagNode, TagTree};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AuthzError, Result};

/// Tag identifier as assigned by the tag store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag as stored: id, unique name and optional parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<TagId>,
}

impl Tag {
    /// Root tag
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: TagId(id),
            name: name.into(),
            parent_id: None,
        }
    }

    /// Tag with a parent
    pub fn child_of(id: u32, name: impl Into<String>, parent: u32) -> Self {
        Self {
            id: TagId(id),
            name: name.into(),
            parent_id: Some(TagId(parent)),
        }
    }

    /// Reject names reserved for auto tags
    pub fn check_name(&self) -> Result<()> {
        if self.name.starts_with('$') {
            return Err(AuthzError::InvalidTag(format!(
                "tag name `{}` starts with `$`, which is reserved for automatic tags",
                self.name
            )));
        }
        Ok(())
    }
}

/// Set of tag ids without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(BTreeSet<TagId>);

impl TagSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag; returns false if it was already present
    pub fn insert(&mut self, id: TagId) -> bool {
        self.0.insert(id)
    }

    /// Membership test
    pub fn contains(&self, id: TagId) -> bool {
        self.0.contains(&id)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in id order
    pub fn iter(&self) -> impl Iterator<Item = TagId> + '_ {
        self.0.iter().copied()
    }

    /// Union of two sets
    pub fn union(&self, other: &TagSet) -> TagSet {
        TagSet(self.0.union(&other.0).copied().collect())
    }

    /// Whether every tag of `other` is in this set
    pub fn is_superset(&self, other: &TagSet) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl FromIterator<TagId> for TagSet {
    fn from_iter<I: IntoIterator<Item = TagId>>(iter: I) -> Self {
        TagSet(iter.into_iter().collect())
    }
}

impl Extend<TagId> for TagSet {
    fn extend<I: IntoIterator<Item = TagId>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}
