//! Property-based tests for compilation, caching and the tag hierarchy

use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

use racktag_authz::engine::cache::{decode, encode, CacheLookup};
use racktag_authz::policy::EvalInput;
use racktag_authz::{
    compile, parse, AuthorizationEngine, AuthzError, CompiledPolicyCache, MemoryStore,
    Operation, RuleSource, ScriptStore, SecurityContext, Tag, TagId, TagTree,
};

// ============================================================================
// GENERATORS
// ============================================================================

const NAMES: [&str; 6] = ["admin", "ops", "net", "dc1", "dc2", "$any_auth"];

fn tag_name() -> impl Strategy<Value = String> {
    prop::sample::select(NAMES.to_vec()).prop_map(|s| s.to_string())
}

fn held_tags() -> impl Strategy<Value = HashSet<String>> {
    prop::sample::subsequence(NAMES.to_vec(), 0..=NAMES.len())
        .prop_map(|names| names.into_iter().map(String::from).collect())
}

fn leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        tag_name().prop_map(|t| format!("{{{t}}}")),
        tag_name().prop_map(|t| format!("tag({t})")),
        Just("true".to_string()),
        Just("false".to_string()),
        (0i64..5).prop_map(|n| format!("attr(height) == {n}")),
        Just("attr(name) != \"srv\"".to_string()),
    ]
}

fn expr() -> impl Strategy<Value = String> {
    leaf().prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} and {b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} or {b})")),
            inner.prop_map(|a| format!("not {a}")),
        ]
    })
}

fn rules() -> impl Strategy<Value = String> {
    prop::collection::vec((any::<bool>(), expr()), 0..6).prop_map(|rules| {
        rules
            .into_iter()
            .map(|(allow, e)| format!("{} {e}", if allow { "allow" } else { "deny" }))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Parent links that always point at a smaller id, so the input is acyclic
fn forest() -> impl Strategy<Value = Vec<Tag>> {
    prop::collection::vec(any::<prop::sample::Index>(), 1..24).prop_map(|parents| {
        parents
            .iter()
            .enumerate()
            .map(|(i, pick)| {
                let id = i as u32 + 1;
                if i == 0 || pick.index(3) == 0 {
                    Tag::new(id, format!("t{id}"))
                } else {
                    Tag::child_of(id, format!("t{id}"), pick.index(i) as u32 + 1)
                }
            })
            .collect()
    })
}

/// Unfolded reference evaluation of a rule text, straight from the parse tree
fn reference_decision(
    text: &str,
    tags: &HashSet<String>,
    attrs: &BTreeMap<String, racktag_authz::AttrValue>,
) -> Option<bool> {
    use racktag_authz::rackcode::{CmpOp, Expr, Statement};

    fn eval(
        e: &Expr,
        tags: &HashSet<String>,
        attrs: &BTreeMap<String, racktag_authz::AttrValue>,
    ) -> bool {
        match e {
            Expr::And(a, b) => eval(a, tags, attrs) && eval(b, tags, attrs),
            Expr::Or(a, b) => eval(a, tags, attrs) || eval(b, tags, attrs),
            Expr::Not(a) => !eval(a, tags, attrs),
            Expr::Tag(t) => tags.contains(t),
            Expr::Attribute { name, op, value } => match op {
                CmpOp::Eq => attrs.get(name) == Some(value),
                CmpOp::Ne => attrs.get(name) != Some(value),
            },
            Expr::Literal(b) => *b,
            Expr::PredicateRef(_) => unreachable!("generator emits no predicates"),
        }
    }

    let doc = parse(text).ok()?;
    for statement in &doc.statements {
        if let Statement::Rule { effect, condition, .. } = statement {
            if eval(condition, tags, attrs) {
                return Some(*effect == racktag_authz::PolicyEffect::Allow);
            }
        }
    }
    Some(false)
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn test_compile_is_deterministic(text in rules()) {
        let source = RuleSource::new(text.clone(), "v");
        prop_assert_eq!(parse(&text).unwrap(), parse(&text).unwrap());
        prop_assert_eq!(compile(&source).unwrap(), compile(&source).unwrap());
    }

    #[test]
    fn test_cache_roundtrip(text in rules()) {
        let table = compile(&RuleSource::new(text, "v")).unwrap();
        prop_assert_eq!(decode(&encode(&table).unwrap()).unwrap(), table);
    }

    #[test]
    fn test_folding_preserves_decisions(
        text in rules(),
        held in held_tags(),
        height in 0i64..5,
    ) {
        let table = compile(&RuleSource::new(text.clone(), "v")).unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert("height".to_string(), racktag_authz::AttrValue::Int(height));
        let input = EvalInput { tags: &held, attributes: &attrs };

        let compiled = table
            .first_match(&input)
            .map(|rule| rule.decision == racktag_authz::PolicyEffect::Allow)
            .unwrap_or(false);
        prop_assert_eq!(Some(compiled), reference_decision(&text, &held, &attrs));
    }

    #[test]
    fn test_corrupted_slot_is_miss(
        text in rules(),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let store = MemoryStore::new();
        let cache = CompiledPolicyCache::new(&store, "RackCodeCache", "v");
        cache.store(&compile(&RuleSource::new(text, "v")).unwrap()).unwrap();

        let mut bytes = store.get("RackCodeCache").unwrap().unwrap().into_bytes();
        let i = position.index(bytes.len());
        bytes[i] ^= flip;
        // keep the text valid UTF-8 so the slot can hold it
        let corrupted = String::from_utf8_lossy(&bytes).into_owned();
        store.set("RackCodeCache", &corrupted).unwrap();

        prop_assert_eq!(cache.load(), CacheLookup::Miss);
        prop_assert_eq!(store.get("RackCodeCache").unwrap().unwrap(), "");
    }

    #[test]
    fn test_random_bytes_never_hit(noise in prop::collection::vec(any::<u8>(), 0..256)) {
        let store = MemoryStore::new();
        store.set("RackCodeCache", &String::from_utf8_lossy(&noise)).unwrap();
        let cache = CompiledPolicyCache::new(&store, "RackCodeCache", "v");
        prop_assert_eq!(cache.load(), CacheLookup::Miss);
    }

    #[test]
    fn test_empty_context_fails_closed(text in rules()) {
        let table = compile(&RuleSource::new(text.clone(), "v")).unwrap();
        let engine = AuthorizationEngine::from_table(table);
        let empty = SecurityContext::empty();
        let decision = engine.authorize(&empty, &empty, &Operation::none());
        let expected = reference_decision(&text, &HashSet::new(), &BTreeMap::new()).unwrap();
        prop_assert_eq!(decision.is_allowed(), expected);
        if decision.matched_rule.is_none() {
            prop_assert!(!decision.is_allowed());
        }
    }

    #[test]
    fn test_closure_is_ancestor_chain(tags in forest(), pick in any::<prop::sample::Index>()) {
        let tree = TagTree::build(tags.clone()).unwrap();
        let start = tags[pick.index(tags.len())].clone();
        let closure = tree.closure(start.id);

        // walk parent links by hand
        let mut expected = vec![start.id];
        let mut current = start.parent_id;
        while let Some(parent) = current {
            expected.push(parent);
            current = tags.iter().find(|t| t.id == parent).and_then(|t| t.parent_id);
        }
        expected.sort();
        prop_assert_eq!(closure.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_any_cycle_is_rejected(mut tags in forest(), pick in any::<prop::sample::Index>()) {
        // re-parenting t1 onto itself or one of its descendants closes a loop
        let descendants: Vec<TagId> = {
            let tree = TagTree::build(tags.clone()).unwrap();
            tags.iter()
                .map(|t| t.id)
                .filter(|id| tree.closure(*id).contains(TagId(1)))
                .collect()
        };
        let target = descendants[pick.index(descendants.len())];
        tags[0].parent_id = Some(target);

        let result = TagTree::build(tags);
        prop_assert!(matches!(result, Err(AuthzError::TagCycle(_))), "expected a cycle error");
    }
}
