//! Runtime bootstrap against the sled store and a TOML directory

use racktag_authz::{
    Directory, EngineConfig, NavigationContext, Operation, PolicyRuntime, ScriptStore,
    SledScriptStore, Target, CODE_VERSION,
};

const DIRECTORY: &str = r#"
[[tags]]
id = 1
name = "network"

[[tags]]
id = 2
name = "core"
parent_id = 1

[[tags]]
id = 3
name = "server"

[[tags]]
id = 4
name = "legacy"
parent_id = 77

[[accounts]]
user_id = 1
username = "netadmin"
tags = ["core"]

[[accounts]]
user_id = 2
username = "sysadmin"
tags = ["server"]
"#;

const RULES: &str = r#"
# network staff may edit anything tagged as network gear
define [netstaff] as {network} and {$any_auth}
allow [netstaff] and {$any_object} and {network}

# nobody edits legacy gear
deny {legacy} and {$op_edit}

allow {server} and {$page_object}
"#;

fn seeded_store(path: &std::path::Path) -> SledScriptStore {
    let store = SledScriptStore::open(path).unwrap();
    store.set("DB_VERSION", CODE_VERSION).unwrap();
    store.set("RackCode", RULES).unwrap();
    store
}

#[test]
fn test_bootstrap_from_sled_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());
    let directory = Directory::from_toml(DIRECTORY).unwrap();

    let runtime = PolicyRuntime::initialize(&EngineConfig::default(), &store, &directory).unwrap();
    assert_eq!(runtime.table().len(), 3);
    assert_eq!(runtime.tree().len(), 4);

    let contexts = runtime.context_builder(&directory);
    let engine = runtime.engine();

    let netadmin = contexts
        .subject_context(directory.account("netadmin").unwrap(), NavigationContext::default())
        .unwrap();
    let switch = contexts.target_context(
        &Target::new("object").with_id(10).with_tag(directory.tag_id("core").unwrap()),
    );
    let decision = engine.authorize(&netadmin, &switch, &Operation::new("edit"));
    assert!(decision.is_allowed());
    assert_eq!(decision.matched_rule, Some(1));

    // the dangling parent of `legacy` makes it a root, not an error
    let old_box = contexts.target_context(
        &Target::new("object").with_id(11).with_tag(directory.tag_id("legacy").unwrap()),
    );
    let sysadmin = contexts
        .subject_context(directory.account("sysadmin").unwrap(), NavigationContext::page("object"))
        .unwrap();
    let decision = engine.authorize(&sysadmin, &old_box, &Operation::new("edit"));
    assert_eq!(decision.matched_rule, Some(2));
    assert!(!decision.is_allowed());
    assert!(engine.authorize(&sysadmin, &old_box, &Operation::none()).is_allowed());
}

#[test]
fn test_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let directory = Directory::from_toml(DIRECTORY).unwrap();

    let first_table = {
        let store = seeded_store(dir.path());
        let runtime =
            PolicyRuntime::initialize(&EngineConfig::default(), &store, &directory).unwrap();
        assert_eq!(runtime.metrics().snapshot().compilations, 1);
        runtime.table()
    };

    let store = SledScriptStore::open(dir.path()).unwrap();
    let runtime = PolicyRuntime::initialize(&EngineConfig::default(), &store, &directory).unwrap();
    let snapshot = runtime.metrics().snapshot();
    assert_eq!(snapshot.compilations, 0);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(runtime.table(), first_table);
}

#[test]
fn test_custom_slot_names() {
    let store = SledScriptStore::temporary().unwrap();
    let mut config = EngineConfig::default();
    config.engine.rule_slot = "Rules".to_string();
    config.engine.cache_slot = "RulesCompiled".to_string();
    config.engine.version_slot = "SchemaVersion".to_string();
    config.engine.expected_schema_version = "7".to_string();
    config.validate().unwrap();

    store.set("SchemaVersion", "7").unwrap();
    store.set("Rules", "allow true").unwrap();

    let runtime = PolicyRuntime::initialize(&config, &store, &Directory::default()).unwrap();
    assert_eq!(runtime.table().schema_version, "7");
    assert!(!store.get("RulesCompiled").unwrap().unwrap().is_empty());
    assert_eq!(store.get("RackCodeCache").unwrap(), None);
}
