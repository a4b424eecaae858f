//! Automatic (synthetic) tags
//!
//! Auto tags are derived from facts the engine already knows about a request
//! and are prefixed with `$`, which stored tag names may not start with.
//!
//! `$username_` carries the login name verbatim so that distinct accounts
//! never share it; page, tab, realm and operation names are normalized.

use std::collections::BTreeSet;

use crate::types::{Identity, NavigationContext, Operation};

/// Every authenticated subject carries this tag
pub const ANY_AUTH: &str = "$any_auth";

/// Present whenever an operation is being checked
pub const ANY_OP: &str = "$any_op";

/// Lower-case and replace anything outside `[a-z0-9_]` with `_`
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect()
}

/// Auto tags of an authenticated subject at a navigation position
pub fn subject_tags(identity: &Identity, nav: &NavigationContext) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    tags.insert(ANY_AUTH.to_string());
    tags.insert(format!("$userid_{}", identity.user_id));
    tags.insert(format!("$username_{}", identity.username));
    if let Some(page) = nav.page.as_deref().filter(|p| !p.is_empty()) {
        tags.insert(format!("$page_{}", normalize(page)));
    }
    if let Some(tab) = nav.tab.as_deref().filter(|t| !t.is_empty()) {
        tags.insert(format!("$tab_{}", normalize(tab)));
    }
    tags
}

/// Auto tags of a target entity
pub fn entity_tags(realm: &str, id: Option<u64>) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if realm.is_empty() {
        return tags;
    }
    let realm = normalize(realm);
    if let Some(id) = id {
        tags.insert(format!("${realm}id_{id}"));
    }
    tags.insert(format!("$any_{realm}"));
    tags
}

/// Auto tags of the operation being checked (none for page access only)
pub fn operation_tags(op: &Operation) -> Vec<String> {
    if op.name.is_empty() {
        return Vec::new();
    }
    vec![ANY_OP.to_string(), format!("$op_{}", normalize(&op.name))]
}
