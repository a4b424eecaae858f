use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::{auto, Principal, SecurityContext};
use crate::error::Result;
use crate::store::AccountStore;
use crate::tags::{TagSet, TagTree};
use crate::types::{Identity, NavigationContext, Target};

/// Assembles security contexts against a fixed tag tree
#[derive(Clone)]
pub struct SecurityContextBuilder<'a> {
    tree: Arc<TagTree>,
    accounts: &'a dyn AccountStore,
}

impl<'a> SecurityContextBuilder<'a> {
    /// Create a builder over `tree`, resolving account tags through `accounts`
    pub fn new(tree: Arc<TagTree>, accounts: &'a dyn AccountStore) -> Self {
        Self { tree, accounts }
    }

    /// Tag tree the builder resolves closures against
    pub fn tree(&self) -> &Arc<TagTree> {
        &self.tree
    }

    /// Fetch the explicit tags of an already verified identity
    ///
    /// Tag ids unknown to the tree are dropped. Store failures are fatal.
    pub fn authenticate(&self, identity: Identity) -> Result<(Identity, TagSet)> {
        let assigned = self.accounts.explicit_tags(&identity)?;
        let explicit: TagSet = assigned
            .into_iter()
            .filter(|id| {
                let known = self.tree.get(*id).is_some();
                if !known {
                    debug!(user = %identity.username, tag = %id, "Ignoring unknown account tag");
                }
                known
            })
            .collect();
        Ok((identity, explicit))
    }

    /// Ancestor closure of `explicit` (a superset of it)
    pub fn compute_implicit(&self, explicit: &TagSet) -> TagSet {
        self.tree.closure_of(explicit)
    }

    /// Synthetic tags for a subject at a navigation position
    pub fn compute_auto(&self, identity: &Identity, nav: &NavigationContext) -> BTreeSet<String> {
        auto::subject_tags(identity, nav)
    }

    /// Full subject context
    pub fn subject_context(
        &self,
        identity: Identity,
        nav: NavigationContext,
    ) -> Result<SecurityContext> {
        let (identity, explicit) = self.authenticate(identity)?;
        let auto = self.compute_auto(&identity, &nav);
        let context = SecurityContext::new(
            Principal::User(identity),
            nav,
            explicit,
            &self.tree,
            auto,
            BTreeMap::new(),
        );
        debug!(
            explicit = context.explicit().len(),
            implicit = context.implicit().len(),
            auto = context.auto().len(),
            "Built subject context"
        );
        Ok(context)
    }

    /// Context of a target entity: its tags, their closure, entity auto tags
    /// and attributes
    pub fn target_context(&self, target: &Target) -> SecurityContext {
        let explicit: TagSet = target
            .tags
            .iter()
            .copied()
            .filter(|id| self.tree.get(*id).is_some())
            .collect();
        let principal = if target.realm.is_empty() {
            Principal::Nobody
        } else {
            Principal::Entity {
                realm: target.realm.clone(),
                id: target.id,
            }
        };
        SecurityContext::new(
            principal,
            NavigationContext::default(),
            explicit,
            &self.tree,
            auto::entity_tags(&target.realm, target.id),
            target.attributes.clone(),
        )
    }
}
