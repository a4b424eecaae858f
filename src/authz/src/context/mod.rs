//! Per-request security contexts
//!
//! A [`SecurityContext`] describes one side of an authorization question
//! (the subject or the target) as layered tag sets:
//!
//! - **explicit**: tags assigned directly in the store
//! - **implicit**: the ancestor closure of the explicit tags (includes them)
//! - **auto**: synthetic `$` tags derived from identity, navigation or entity
//! - **given**: tags granted for the current session only
//!
//! Contexts are values. Changing navigation or granting a tag produces a new
//! context and leaves the original untouched, so a context can be shared
//! freely between threads.

pub mod auto;
mod builder;

pub use builder::SecurityContextBuilder;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::tags::{TagSet, TagTree};
use crate::types::{AttrValue, Identity, NavigationContext};

/// Whose context this is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Authenticated user
    User(Identity),
    /// Target entity
    Entity { realm: String, id: Option<u64> },
    /// No entity (page-level checks)
    Nobody,
}

/// Layered tag sets of a subject or target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    principal: Principal,
    navigation: NavigationContext,
    explicit: TagSet,
    implicit: TagSet,
    /// Names of `implicit`, resolved once against the tag tree
    implicit_names: BTreeSet<String>,
    auto: BTreeSet<String>,
    given: BTreeSet<String>,
    attributes: BTreeMap<String, AttrValue>,
    effective: HashSet<String>,
}

impl SecurityContext {
    pub(crate) fn new(
        principal: Principal,
        navigation: NavigationContext,
        explicit: TagSet,
        tree: &TagTree,
        auto: BTreeSet<String>,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Self {
        let implicit = tree.closure_of(&explicit);
        let implicit_names = tree.names(&implicit).map(str::to_string).collect();
        let mut context = Self {
            principal,
            navigation,
            explicit,
            implicit,
            implicit_names,
            auto,
            given: BTreeSet::new(),
            attributes,
            effective: HashSet::new(),
        };
        context.refresh();
        context
    }

    /// Empty context (no tags, no attributes)
    pub fn empty() -> Self {
        Self {
            principal: Principal::Nobody,
            navigation: NavigationContext::default(),
            explicit: TagSet::new(),
            implicit: TagSet::new(),
            implicit_names: BTreeSet::new(),
            auto: BTreeSet::new(),
            given: BTreeSet::new(),
            attributes: BTreeMap::new(),
            effective: HashSet::new(),
        }
    }

    fn refresh(&mut self) {
        self.effective = self
            .implicit_names
            .iter()
            .chain(self.auto.iter())
            .chain(self.given.iter())
            .cloned()
            .collect();
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Identity, for user contexts
    pub fn identity(&self) -> Option<&Identity> {
        match &self.principal {
            Principal::User(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.navigation
    }

    pub fn explicit(&self) -> &TagSet {
        &self.explicit
    }

    pub fn implicit(&self) -> &TagSet {
        &self.implicit
    }

    pub fn auto(&self) -> &BTreeSet<String> {
        &self.auto
    }

    pub fn given(&self) -> &BTreeSet<String> {
        &self.given
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    /// Every tag name a rule can see on this side of the request
    pub fn effective_names(&self) -> &HashSet<String> {
        &self.effective
    }

    /// Whether a tag name is visible to rules
    pub fn has_tag(&self, name: &str) -> bool {
        self.effective.contains(name)
    }

    /// Same context at a different navigation position
    ///
    /// Only the auto layer is recomputed; explicit, implicit and given tags
    /// carry over unchanged.
    pub fn with_navigation(&self, navigation: NavigationContext) -> Self {
        let mut next = self.clone();
        next.auto = match &self.principal {
            Principal::User(identity) => auto::subject_tags(identity, &navigation),
            Principal::Entity { .. } | Principal::Nobody => self.auto.clone(),
        };
        next.navigation = navigation;
        next.refresh();
        next
    }

    /// Context with a session tag added
    pub fn grant(&self, tag: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.given.insert(tag.into());
        next.refresh();
        next
    }

    /// Context with a session tag removed
    pub fn revoke(&self, tag: &str) -> Self {
        let mut next = self.clone();
        next.given.remove(tag);
        next.refresh();
        next
    }
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self::empty()
    }
}
