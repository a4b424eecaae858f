//! Process bootstrap: schema gate, cached or fresh compilation, tag tree

use std::sync::Arc;
use tracing::{info, warn};

use super::cache::{CacheLookup, CompiledPolicyCache, CompiledSlot};
use super::metrics::MetricsCollector;
use super::AuthorizationEngine;
use crate::config::{EngineConfig, EngineSection};
use crate::context::SecurityContextBuilder;
use crate::error::{AuthzError, Result};
use crate::policy::{compile, CompiledPolicyTable, RuleSource};
use crate::store::{AccountStore, ScriptStore, TagStore};
use crate::tags::TagTree;

/// Everything a process needs to answer authorization questions
#[derive(Debug)]
pub struct PolicyRuntime {
    config: EngineSection,
    slot: Arc<CompiledSlot>,
    tree: Arc<TagTree>,
    metrics: Arc<MetricsCollector>,
}

impl PolicyRuntime {
    /// Bring the policy layer up
    ///
    /// 1. the store's schema version must match the expected one
    /// 2. the compiled table comes from the cache slot, or is compiled from
    ///    the rule source and written back
    /// 3. the tag tree is built from the tag store
    ///
    /// # Errors
    ///
    /// Schema mismatch, storage failures, rule syntax errors and tag cycles
    /// are all fatal.
    pub fn initialize(
        config: &EngineConfig,
        scripts: &dyn ScriptStore,
        tags: &dyn TagStore,
    ) -> Result<Self> {
        let section = config.engine.clone();
        let metrics = Arc::new(MetricsCollector::new());

        check_schema(&section, scripts)?;

        let cache = CompiledPolicyCache::new(
            scripts,
            section.cache_slot.clone(),
            section.expected_schema_version.clone(),
        )
        .with_metrics(Arc::clone(&metrics));

        let table = match cache.load() {
            CacheLookup::Hit(table) => table,
            CacheLookup::Miss => {
                let text = scripts.get(&section.rule_slot)?.unwrap_or_default();
                let source = RuleSource::new(text, section.expected_schema_version.clone());
                let table = compile(&source)?;
                metrics.record_compilation();
                info!(rules = table.len(), "Compiled rule source");
                if let Err(e) = cache.store(&table) {
                    warn!(error = %e, "Failed to write compiled policy cache");
                }
                table
            }
        };

        let tree = TagTree::build(tags.all_tags()?)?;

        info!(
            rules = table.len(),
            tags = tree.len(),
            schema = %section.expected_schema_version,
            "Policy runtime initialized"
        );

        Ok(Self {
            config: section,
            slot: Arc::new(CompiledSlot::new(table)),
            tree: Arc::new(tree),
            metrics,
        })
    }

    /// Engine bound to this runtime's table slot and metrics
    pub fn engine(&self) -> AuthorizationEngine {
        AuthorizationEngine::new(Arc::clone(&self.slot)).with_metrics(Arc::clone(&self.metrics))
    }

    /// Context builder over this runtime's tag tree
    pub fn context_builder<'a>(
        &self,
        accounts: &'a dyn AccountStore,
    ) -> SecurityContextBuilder<'a> {
        SecurityContextBuilder::new(Arc::clone(&self.tree), accounts)
    }

    /// Table currently in effect
    pub fn table(&self) -> Arc<CompiledPolicyTable> {
        self.slot.current()
    }

    pub fn tree(&self) -> &Arc<TagTree> {
        &self.tree
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Compile `text` without installing it
    ///
    /// Syntax errors carry the line and column of the offending token.
    pub fn validate_source(&self, text: &str) -> Result<CompiledPolicyTable> {
        compile(&RuleSource::new(text, self.config.expected_schema_version.clone()))
    }

    /// Replace the rule source
    ///
    /// The text is validated first; nothing is written if it does not
    /// compile. See [`PolicyRuntime::install_into`] for the write order. The
    /// new table becomes active for every engine of this runtime as soon as
    /// the rule slot holds it.
    pub fn install_source(&self, scripts: &dyn ScriptStore, text: &str) -> Result<()> {
        let table = self.validate_source(text)?;
        self.metrics.record_compilation();

        commit_source(&self.config, scripts, text, &table, || {
            self.slot.replace(table.clone());
        })?;
        info!(rules = table.len(), "Installed new rule source");
        Ok(())
    }

    /// Install rule source into a store without a running runtime
    ///
    /// The store must pass the schema gate. Writes happen in this order,
    /// each failure aborting the rest:
    ///
    /// 1. the cache slot is emptied
    /// 2. the rule slot receives `text`
    /// 3. the cache slot receives the new encoding
    ///
    /// A failure at any step leaves either the old source or the new source
    /// with an empty cache, never a cache that disagrees with the source.
    pub fn install_into(
        config: &EngineConfig,
        scripts: &dyn ScriptStore,
        text: &str,
    ) -> Result<CompiledPolicyTable> {
        check_schema(&config.engine, scripts)?;
        let table = compile(&RuleSource::new(
            text,
            config.engine.expected_schema_version.clone(),
        ))?;
        commit_source(&config.engine, scripts, text, &table, || {})?;
        info!(rules = table.len(), "Installed new rule source");
        Ok(table)
    }

    /// Stamp a fresh store with the expected schema version
    ///
    /// Does nothing if the store already carries that version.
    ///
    /// # Errors
    ///
    /// [`AuthzError::SchemaMismatch`] if the store carries another version.
    pub fn prepare_store(config: &EngineConfig, scripts: &dyn ScriptStore) -> Result<()> {
        let section = &config.engine;
        match scripts.get(&section.version_slot)? {
            None => {
                scripts.set(&section.version_slot, &section.expected_schema_version)?;
                info!(version = %section.expected_schema_version, "Initialized schema version");
                Ok(())
            }
            Some(_) => check_schema(section, scripts),
        }
    }
}

fn commit_source(
    section: &EngineSection,
    scripts: &dyn ScriptStore,
    text: &str,
    table: &CompiledPolicyTable,
    committed: impl FnOnce(),
) -> Result<()> {
    let cache = CompiledPolicyCache::new(
        scripts,
        section.cache_slot.clone(),
        section.expected_schema_version.clone(),
    );
    cache.clear()?;
    scripts.set(&section.rule_slot, text)?;
    committed();
    if let Err(e) = cache.store(table) {
        warn!(error = %e, "Rule source installed but compiled policy cache not written");
        return Err(e);
    }
    Ok(())
}

fn check_schema(config: &EngineSection, scripts: &dyn ScriptStore) -> Result<()> {
    let found = scripts.get(&config.version_slot)?;
    match found {
        Some(version) if version.trim() == config.expected_schema_version => Ok(()),
        other => Err(AuthzError::SchemaMismatch {
            expected: config.expected_schema_version.clone(),
            found: other.unwrap_or_else(|| "<absent>".to_string()),
        }),
    }
}
