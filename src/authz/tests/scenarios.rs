//! End-to-end authorization scenarios
//!
//! Each test seeds an in-memory store, brings a runtime up and asks the
//! engine a question the way a request handler would.

use racktag_authz::engine::cache::{self, CacheLookup};
use racktag_authz::policy::{CompiledExpr, CompiledRule};
use racktag_authz::{
    compile, CompiledPolicyCache, EngineConfig, Identity, MemoryStore, NavigationContext,
    Operation, PolicyEffect, PolicyRuntime, RuleSource, ScriptStore, SecurityContext, Tag, TagId,
    Target, CODE_VERSION,
};

fn store_with(rules: &str, tags: Vec<Tag>) -> MemoryStore {
    let store = MemoryStore::new();
    store.set("DB_VERSION", CODE_VERSION).unwrap();
    store.set("RackCode", rules).unwrap();
    store.set_tags(tags);
    store
}

fn runtime(store: &MemoryStore) -> PolicyRuntime {
    PolicyRuntime::initialize(&EngineConfig::default(), store, store).unwrap()
}

// ============================================================================
// SCENARIO A: single allow rule
// ============================================================================

#[test]
fn test_scenario_single_tag_rule() {
    let table = compile(&RuleSource::new("ALLOW IF tag(admin)", CODE_VERSION)).unwrap();
    assert_eq!(
        table.entries,
        vec![CompiledRule {
            condition: CompiledExpr::Tag("admin".into()),
            decision: PolicyEffect::Allow,
            declaration_order: 1,
            line: 1,
        }]
    );

    let store = store_with("ALLOW IF tag(admin)", vec![Tag::new(1, "admin")]);
    store.assign(1, [TagId(1)]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);

    let subject = contexts
        .subject_context(Identity::new(1, "alice"), NavigationContext::default())
        .unwrap();
    let decision = runtime
        .engine()
        .authorize(&subject, &SecurityContext::empty(), &Operation::none());
    assert_eq!(decision.effect, PolicyEffect::Allow);
    assert_eq!(decision.matched_rule, Some(1));
}

// ============================================================================
// SCENARIO B: corrupted cache slot
// ============================================================================

#[test]
fn test_scenario_corrupted_cache_recompiles() {
    let rules = "allow {admin}\ndeny true";
    let store = store_with(rules, vec![Tag::new(1, "admin")]);
    store.set("RackCodeCache", "\u{1}\u{2}garbage==").unwrap();

    let cache = CompiledPolicyCache::new(&store, "RackCodeCache", CODE_VERSION);
    assert_eq!(cache.load(), CacheLookup::Miss);

    store.set("RackCodeCache", "\u{1}\u{2}garbage==").unwrap();
    let runtime = runtime(&store);
    let snapshot = runtime.metrics().snapshot();
    assert_eq!(snapshot.cache_corruptions, 1);
    assert_eq!(snapshot.compilations, 1);

    // the slot now holds a fresh, decodable encoding of the same table
    let text = store.get("RackCodeCache").unwrap().unwrap();
    let expected = compile(&RuleSource::new(rules, CODE_VERSION)).unwrap();
    assert_eq!(cache::decode(&text).unwrap(), expected);
    assert_eq!(*runtime.table(), expected);
}

// ============================================================================
// SCENARIO C: no overlap means deny
// ============================================================================

#[test]
fn test_scenario_no_overlap_denies() {
    let store = store_with(
        "allow {admin}\nallow {ops} and {$op_edit}",
        vec![Tag::new(1, "admin"), Tag::new(2, "ops"), Tag::new(3, "guest")],
    );
    store.assign(1, [TagId(3)]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);

    let subject = contexts
        .subject_context(Identity::new(1, "visitor"), NavigationContext::page("rackspace"))
        .unwrap();
    let decision = runtime
        .engine()
        .authorize(&subject, &SecurityContext::empty(), &Operation::new("edit"));
    assert_eq!(decision.effect, PolicyEffect::Deny);
    assert_eq!(decision.matched_rule, None);
}

// ============================================================================
// SCENARIO D: inherited tag
// ============================================================================

#[test]
fn test_scenario_parent_tag_inherited() {
    let store = store_with("ALLOW IF tag(A)", vec![Tag::new(1, "A"), Tag::child_of(2, "B", 1)]);
    store.assign(1, [TagId(2)]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);

    let subject = contexts
        .subject_context(Identity::new(1, "bob"), NavigationContext::default())
        .unwrap();
    assert!(subject.implicit().contains(TagId(1)));
    assert!(subject.implicit().contains(TagId(2)));

    let decision = runtime
        .engine()
        .authorize(&subject, &SecurityContext::empty(), &Operation::none());
    assert!(decision.is_allowed());
}

#[test]
fn test_target_tag_inherited() {
    let store = store_with(
        "allow {datacenter} and {$op_edit}",
        vec![Tag::new(1, "datacenter"), Tag::child_of(2, "row-7", 1)],
    );
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);

    let subject = contexts
        .subject_context(Identity::new(9, "carol"), NavigationContext::default())
        .unwrap();
    let target = contexts.target_context(&Target::new("rack").with_id(12).with_tag(TagId(2)));

    let engine = runtime.engine();
    assert!(engine.authorize(&subject, &target, &Operation::new("edit")).is_allowed());
    assert!(!engine.authorize(&subject, &target, &Operation::new("del")).is_allowed());
}

// ============================================================================
// SCENARIO E: first match wins
// ============================================================================

#[test]
fn test_scenario_first_match_wins() {
    let store = store_with(
        "DENY IF tag(ops)\nALLOW IF tag(ops)",
        vec![Tag::new(1, "ops")],
    );
    store.assign(1, [TagId(1)]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);

    let subject = contexts
        .subject_context(Identity::new(1, "dave"), NavigationContext::default())
        .unwrap();
    let decision = runtime
        .engine()
        .authorize(&subject, &SecurityContext::empty(), &Operation::none());
    assert_eq!(decision.effect, PolicyEffect::Deny);
    assert_eq!(decision.matched_rule, Some(1));
}

// ============================================================================
// CONTEXT ISOLATION
// ============================================================================

#[test]
fn test_navigation_change_does_not_affect_other_context() {
    let store = store_with("allow {$page_config}", vec![]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);
    let engine = runtime.engine();

    let on_index = contexts
        .subject_context(Identity::new(1, "erin"), NavigationContext::page("index"))
        .unwrap();
    let snapshot = on_index.clone();
    let on_config = on_index.with_navigation(NavigationContext::page("config"));

    assert!(engine.permitted(&on_config, &Operation::none()));
    assert!(!engine.permitted(&on_index, &Operation::none()));
    assert_eq!(on_index, snapshot);
    assert_eq!(on_config.explicit(), on_index.explicit());
    assert_eq!(on_config.implicit(), on_index.implicit());
    assert_eq!(on_config.given(), on_index.given());
}

#[test]
fn test_session_elevation_survives_navigation() {
    let store = store_with(
        "allow {$page_config} and {superuser}\ndeny true",
        vec![Tag::new(1, "staff")],
    );
    store.assign(1, [TagId(1)]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);
    let engine = runtime.engine();

    let plain = contexts
        .subject_context(Identity::new(1, "gina"), NavigationContext::page("index"))
        .unwrap();
    let elevated = plain.grant("superuser");
    let snapshot = elevated.clone();

    let moved = elevated.with_navigation(NavigationContext::page("config"));
    assert!(engine.permitted(&moved, &Operation::none()));
    let elsewhere = plain.with_navigation(NavigationContext::page("config"));
    assert!(!engine.permitted(&elsewhere, &Operation::none()));

    assert_eq!(moved.explicit(), elevated.explicit());
    assert_eq!(moved.implicit(), elevated.implicit());
    assert_eq!(moved.given(), elevated.given());
    assert_eq!(elevated, snapshot);
}

#[test]
fn test_target_session_tags() {
    let store = store_with(
        "deny {frozen} and {$op_edit}\nallow {$any_auth}",
        vec![Tag::new(1, "rackspace")],
    );
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);
    let engine = runtime.engine();

    let subject = contexts
        .subject_context(Identity::new(4, "hank"), NavigationContext::default())
        .unwrap();
    let rack = contexts.target_context(&Target::new("rack").with_id(8).with_tag(TagId(1)));
    let frozen = rack.grant("frozen");

    assert!(engine.authorize(&subject, &rack, &Operation::new("edit")).is_allowed());
    let decision = engine.authorize(&subject, &frozen, &Operation::new("edit"));
    assert_eq!(decision.matched_rule, Some(1));
    assert!(!decision.is_allowed());

    assert!(!subject.has_tag("frozen"));
    assert!(!rack.has_tag("frozen"));
    assert_eq!(frozen.explicit(), rack.explicit());
    let thawed = frozen.revoke("frozen");
    assert!(engine.authorize(&subject, &thawed, &Operation::new("edit")).is_allowed());
}

#[test]
fn test_contexts_shared_across_threads() {
    let store = store_with("allow {$userid_1}", vec![]);
    let runtime = runtime(&store);
    let contexts = runtime.context_builder(&store);
    let engine = runtime.engine();

    let alice = contexts
        .subject_context(Identity::new(1, "alice"), NavigationContext::default())
        .unwrap();
    let bob = contexts
        .subject_context(Identity::new(2, "bob"), NavigationContext::default())
        .unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    assert!(engine.permitted(&alice, &Operation::none()));
                    assert!(!engine.permitted(&bob, &Operation::none()));
                }
            });
        }
    });
    assert_eq!(runtime.metrics().snapshot().total_requests, 800);
}

#[test]
fn test_install_visible_to_running_engines() {
    let store = store_with("deny true", vec![]);
    let runtime = runtime(&store);
    let engine = runtime.engine();
    let subject = runtime
        .context_builder(&store)
        .subject_context(Identity::new(1, "frank"), NavigationContext::default())
        .unwrap();

    assert!(!engine.permitted(&subject, &Operation::none()));
    runtime.install_source(&store, "allow {$any_auth}").unwrap();
    assert!(engine.permitted(&subject, &Operation::none()));

    // a fresh process picks the new table up from the cache
    let restarted = PolicyRuntime::initialize(&EngineConfig::default(), &store, &store).unwrap();
    assert_eq!(restarted.metrics().snapshot().cache_hits, 1);
    assert_eq!(restarted.table(), runtime.table());
}
