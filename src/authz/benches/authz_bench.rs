//! Authorization engine benchmarks
//!
//! - rule compilation for growing rule sets
//! - `authorize` where the matching rule sits at the end of the table
//! - tag closure over a deep hierarchy

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use racktag_authz::{
    compile, AuthorizationEngine, Identity, MemoryStore, NavigationContext, Operation, RuleSource,
    SecurityContextBuilder, Tag, TagId, TagTree, Target,
};

fn rule_text(count: usize) -> String {
    let mut text = String::from("define [staff] as {$any_auth} and not {suspended}\n");
    for i in 0..count {
        text.push_str(&format!(
            "deny {{team-{i}}} and {{$op_del}} and attr(height) == {i}\n"
        ));
    }
    text.push_str("allow [staff] and {team-0}\n");
    text
}

fn chain(depth: u32) -> Vec<Tag> {
    (1..=depth)
        .map(|id| {
            if id == 1 {
                Tag::new(id, format!("team-{}", id - 1))
            } else {
                Tag::child_of(id, format!("team-{}", id - 1), id - 1)
            }
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for count in [10, 100, 1000] {
        let source = RuleSource::new(rule_text(count), "bench");
        group.bench_with_input(BenchmarkId::new("rules", count), &source, |b, source| {
            b.iter(|| compile(black_box(source)).unwrap());
        });
    }

    group.finish();
}

fn bench_authorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("authorize");

    for count in [10, 100, 1000] {
        let tree = Arc::new(TagTree::build(chain(32)).unwrap());
        let store = MemoryStore::new();
        store.assign(1, [TagId(32)]);
        let contexts = SecurityContextBuilder::new(tree, &store);

        let subject = contexts
            .subject_context(Identity::new(1, "bench"), NavigationContext::new("object", "default"))
            .unwrap();
        let target = contexts
            .target_context(&Target::new("object").with_id(1).with_attribute("height", 2i64));
        let engine = AuthorizationEngine::from_table(
            compile(&RuleSource::new(rule_text(count), "bench")).unwrap(),
        );
        let op = Operation::new("edit");

        group.bench_function(BenchmarkId::new("rules", count), |b| {
            b.iter(|| engine.authorize(black_box(&subject), black_box(&target), black_box(&op)));
        });
    }

    group.finish();
}

fn bench_closure(c: &mut Criterion) {
    let tree = TagTree::build(chain(256)).unwrap();

    c.bench_function("closure_depth_256", |b| {
        b.iter(|| tree.closure(black_box(TagId(256))));
    });
}

criterion_group!(benches, bench_compile, bench_authorize, bench_closure);
criterion_main!(benches);
