//! Core request types shared by the context builder and the engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar attribute value of a target entity or a rule literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttrValue {
    /// Text value
    Str(String),
    /// Integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
}

impl AttrValue {
    /// Parse a loosely typed value: integers and booleans are recognised,
    /// anything else stays text.
    pub fn infer(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return AttrValue::Int(n);
        }
        match raw {
            "true" => AttrValue::Bool(true),
            "false" => AttrValue::Bool(false),
            _ => AttrValue::Str(raw.to_string()),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::Int(n) => write!(f, "{}", n),
            AttrValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Authenticated subject
///
/// Credential verification happens outside this crate; an `Identity` is what
/// remains once the remote user has been recognised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Numeric account id
    pub user_id: u32,

    /// Login name
    pub username: String,
}

impl Identity {
    /// Create a new identity
    pub fn new(user_id: u32, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// Current navigation position (module page and tab)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavigationContext {
    /// Page (module) identifier, e.g. "rackspace"
    pub page: Option<String>,

    /// Tab identifier within the page, e.g. "default"
    pub tab: Option<String>,
}

impl NavigationContext {
    /// Navigation context for a page/tab pair
    pub fn new(page: impl Into<String>, tab: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            tab: Some(tab.into()),
        }
    }

    /// Navigation context with only a page
    pub fn page(page: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            tab: None,
        }
    }
}

/// Operation being performed on the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    /// Operation name (e.g. "edit", "del")
    pub name: String,
}

impl Operation {
    /// Create a new operation
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// No specific operation, only page access
    pub fn none() -> Self {
        Self {
            name: String::new(),
        }
    }
}

/// Entity being accessed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Entity realm (e.g. "object", "rack", "ipv4net")
    pub realm: String,

    /// Entity id within its realm
    pub id: Option<u64>,

    /// Explicitly assigned tag ids
    #[serde(default)]
    pub tags: Vec<crate::tags::TagId>,

    /// Scalar attributes available to attribute predicates
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Target {
    /// Create a target for an entity of `realm`
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            ..Default::default()
        }
    }

    /// Set the entity id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Add an explicit tag
    pub fn with_tag(mut self, tag: crate::tags::TagId) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// A target that carries nothing (page-level checks)
    pub fn none() -> Self {
        Self::default()
    }
}
