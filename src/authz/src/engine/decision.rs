//! Authorization decision

use serde::{Deserialize, Serialize};

use crate::policy::{CompiledPolicyTable, CompiledRule, PolicyEffect};

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDecision {
    /// Allow or Deny
    pub effect: PolicyEffect,

    /// Declaration order of the rule that decided, if any
    pub matched_rule: Option<u32>,

    /// Why the decision was reached
    pub reason: DecisionReason,
}

impl AuthDecision {
    /// Decision taken by a matching rule of `table`
    pub fn from_rule(table: &CompiledPolicyTable, rule: &CompiledRule) -> Self {
        Self {
            effect: rule.decision,
            matched_rule: Some(rule.declaration_order),
            reason: DecisionReason::RuleMatch {
                line: rule.line,
                condition: table.describe(&rule.condition),
            },
        }
    }

    /// Deny because nothing matched
    pub fn default_deny() -> Self {
        Self {
            effect: PolicyEffect::Deny,
            matched_rule: None,
            reason: DecisionReason::DefaultDecision {
                reason: "no rule matched".to_string(),
            },
        }
    }

    /// Whether the request is allowed
    pub fn is_allowed(&self) -> bool {
        self.effect == PolicyEffect::Allow
    }
}

/// Reason for an authorization decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecisionReason {
    /// A rule matched
    RuleMatch { line: u32, condition: String },

    /// No rule matched, the default applies
    DefaultDecision { reason: String },
}
