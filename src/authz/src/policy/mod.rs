//! Policy effects, compiled predicate tables and the table builder

pub mod builder;
pub mod table;

pub use builder::{compile, PredicateTableBuilder};
pub use table::{CompiledExpr, CompiledPolicyTable, CompiledPredicate, CompiledRule, EvalInput};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyEffect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

impl fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEffect::Allow => f.pad("ALLOW"),
            PolicyEffect::Deny => f.pad("DENY"),
        }
    }
}

/// Rule source text together with the schema version it was written for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    /// Policy rules
    pub text: String,

    /// Schema version tag of the store the text was read from
    pub schema_version: String,
}

impl RuleSource {
    /// Create a rule source
    pub fn new(text: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schema_version: schema_version.into(),
        }
    }
}
