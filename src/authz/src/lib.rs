//! # RackTag Authorization Engine
//!
//! Tag-based access control for an asset-tracking application.
//!
//! ## Features
//!
//! - **Rule language** with `ALLOW`/`DENY` rules over tags, target attributes
//!   and named predicates
//! - **Compiled predicate tables** evaluated first-match-wins, default deny
//! - **Persistent compile cache** in a single text slot, validated by
//!   checksum and schema version
//! - **Tag hierarchy** with ancestor closure and cycle detection
//! - **Layered security contexts**: explicit, implicit, automatic and
//!   session-given tags
//!
//! ## Example
//!
//! ```rust
//! use racktag_authz::{
//!     EngineConfig, Identity, MemoryStore, NavigationContext, Operation, PolicyRuntime,
//!     ScriptStore, Tag, TagId, Target, CODE_VERSION,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     store.set("DB_VERSION", CODE_VERSION)?;
//!     store.set("RackCode", "ALLOW IF tag(admin)")?;
//!     store.set_tags(vec![Tag::new(1, "admin")]);
//!     store.assign(1, [TagId(1)]);
//!
//!     let runtime = PolicyRuntime::initialize(&EngineConfig::default(), &store, &store)?;
//!     let contexts = runtime.context_builder(&store);
//!
//!     let subject =
//!         contexts.subject_context(Identity::new(1, "alice"), NavigationContext::default())?;
//!     let target = contexts.target_context(&Target::new("object").with_id(7));
//!
//!     let decision = runtime.engine().authorize(&subject, &target, &Operation::new("edit"));
//!     assert!(decision.is_allowed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod policy;
pub mod rackcode;
pub mod store;
pub mod tags;
pub mod types;

pub use config::EngineConfig;
pub use context::{SecurityContext, SecurityContextBuilder};
pub use engine::{
    AuthDecision, AuthorizationEngine, CacheLookup, CompiledPolicyCache, CompiledSlot,
    EngineMetrics, MetricsCollector, PolicyRuntime,
};
pub use error::{AuthzError, Result, SyntaxError};
pub use policy::{compile, CompiledPolicyTable, PolicyEffect, PredicateTableBuilder, RuleSource};
pub use rackcode::parse;
pub use store::{AccountStore, Directory, MemoryStore, ScriptStore, SledScriptStore, TagStore};
pub use tags::{Tag, TagId, TagSet, TagTree};
pub use types::{AttrValue, Identity, NavigationContext, Operation, Target};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage schema version this build understands
pub const CODE_VERSION: &str = "0.20.11";
