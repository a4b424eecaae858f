//! Authorization engine and policy runtime
//!
//! ```text
//! ScriptStore ──► schema gate ──► CompiledPolicyCache ──hit──► CompiledSlot
//!                                        │miss                    │
//!                                        ▼                        ▼
//!                             parse + build + store       AuthorizationEngine
//!                                                                 ▲
//! TagStore ──► TagTree ──► SecurityContextBuilder ──► SecurityContext
//! ```

pub mod cache;
pub mod decision;
pub mod metrics;
mod runtime;

pub use cache::{CacheEntry, CacheLookup, CacheStatus, CompiledPolicyCache, CompiledSlot};
pub use decision::{AuthDecision, DecisionReason};
pub use metrics::{EngineMetrics, MetricsCollector};
pub use runtime::PolicyRuntime;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::context::{auto, SecurityContext};
use crate::policy::{CompiledPolicyTable, EvalInput};
use crate::types::Operation;

/// Evaluates the active predicate table against request contexts
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    table: Arc<CompiledSlot>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AuthorizationEngine {
    /// Engine reading the table from a shared slot
    pub fn new(table: Arc<CompiledSlot>) -> Self {
        Self {
            table,
            metrics: None,
        }
    }

    /// Engine over a fixed table
    pub fn from_table(table: CompiledPolicyTable) -> Self {
        Self::new(Arc::new(CompiledSlot::new(table)))
    }

    /// Count decisions and latency
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decide whether `subject` may perform `op` on `target`
    ///
    /// Rules are tried in declaration order and the first whose condition
    /// holds decides. If none holds the request is denied.
    pub fn authorize(
        &self,
        subject: &SecurityContext,
        target: &SecurityContext,
        op: &Operation,
    ) -> AuthDecision {
        let start = Instant::now();
        let table = self.table.current();

        let mut tags: HashSet<String> = subject
            .effective_names()
            .iter()
            .chain(target.effective_names().iter())
            .cloned()
            .collect();
        tags.extend(auto::operation_tags(op));

        let input = EvalInput {
            tags: &tags,
            attributes: target.attributes(),
        };

        let decision = match table.first_match(&input) {
            Some(rule) => AuthDecision::from_rule(&table, rule),
            None => AuthDecision::default_deny(),
        };

        debug!(
            effect = %decision.effect,
            rule = ?decision.matched_rule,
            op = %op.name,
            "Authorization decision"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.is_allowed(), decision.matched_rule.is_none());
            metrics.record_latency(start.elapsed());
        }

        decision
    }

    /// Page-level check: no target entity
    pub fn permitted(&self, subject: &SecurityContext, op: &Operation) -> bool {
        self.authorize(subject, &SecurityContext::empty(), op)
            .is_allowed()
    }

    /// Table currently in effect
    pub fn table(&self) -> Arc<CompiledPolicyTable> {
        self.table.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SecurityContextBuilder;
    use crate::policy::{compile, PolicyEffect, RuleSource};
    use crate::store::MemoryStore;
    use crate::tags::{Tag, TagId, TagTree};
    use crate::types::{Identity, NavigationContext, Target};

    fn engine(text: &str) -> AuthorizationEngine {
        AuthorizationEngine::from_table(compile(&RuleSource::new(text, "t")).unwrap())
    }

    fn subject(tags: &[u32], nav: NavigationContext) -> SecurityContext {
        let tree = TagTree::build(vec![
            Tag::new(1, "admin"),
            Tag::new(2, "ops"),
            Tag::child_of(3, "ops-east", 2),
        ])
        .unwrap();
        let store = MemoryStore::new();
        store.assign(1, tags.iter().map(|&t| TagId(t)));
        SecurityContextBuilder::new(Arc::new(tree), &store)
            .subject_context(Identity::new(1, "alice"), nav)
            .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let engine = engine("deny {admin}\nallow {admin}");
        let decision = engine.authorize(
            &subject(&[1], NavigationContext::default()),
            &SecurityContext::empty(),
            &Operation::none(),
        );
        assert_eq!(decision.effect, PolicyEffect::Deny);
        assert_eq!(decision.matched_rule, Some(1));
    }

    #[test]
    fn test_no_match_denies() {
        let engine = engine("allow {admin}");
        let decision = engine.authorize(
            &subject(&[2], NavigationContext::default()),
            &SecurityContext::empty(),
            &Operation::none(),
        );
        assert_eq!(decision, AuthDecision::default_deny());
    }

    #[test]
    fn test_empty_table_denies() {
        let ctx = subject(&[1], NavigationContext::default());
        assert!(!engine("").permitted(&ctx, &Operation::none()));
    }

    #[test]
    fn test_operation_and_navigation_tags() {
        let engine = engine("allow {$page_object} and {$op_edit} and {ops}");
        let ctx = subject(&[3], NavigationContext::new("object", "default"));
        assert!(engine.permitted(&ctx, &Operation::new("edit")));
        assert!(!engine.permitted(&ctx, &Operation::new("del")));
        assert!(!engine.permitted(
            &ctx.with_navigation(NavigationContext::page("rackspace")),
            &Operation::new("edit")
        ));
    }

    #[test]
    fn test_target_tags_and_attributes() {
        let engine = engine("allow {$any_object} and attr(name) == \"srv1\"\ndeny true");
        let ctx = subject(&[], NavigationContext::default());
        let store = MemoryStore::new();
        let builder =
            SecurityContextBuilder::new(Arc::new(TagTree::default()), &store);

        let target = builder
            .target_context(&Target::new("object").with_id(7).with_attribute("name", "srv1"));
        assert!(engine.authorize(&ctx, &target, &Operation::none()).is_allowed());

        let other = builder.target_context(&Target::new("object").with_attribute("name", "srv2"));
        let decision = engine.authorize(&ctx, &other, &Operation::none());
        assert_eq!(decision.matched_rule, Some(2));
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_given_tags_count() {
        let engine = engine("allow {maintenance}");
        let ctx = subject(&[], NavigationContext::default());
        assert!(!engine.permitted(&ctx, &Operation::none()));
        assert!(engine.permitted(&ctx.grant("maintenance"), &Operation::none()));
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(MetricsCollector::new());
        let engine = engine("allow {admin}").with_metrics(metrics.clone());
        let ctx = subject(&[1], NavigationContext::default());
        engine.permitted(&ctx, &Operation::none());
        engine.permitted(&subject(&[], NavigationContext::default()), &Operation::none());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.allowed_decisions, 1);
        assert_eq!(snapshot.default_denials, 1);
    }
}
