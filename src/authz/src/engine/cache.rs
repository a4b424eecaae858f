//! Compiled policy cache
//!
//! The compiled predicate table is persisted in a single text slot of the
//! [`ScriptStore`] so that processes can skip compilation when the rule
//! source has not changed. The slot holds
//!
//! ```text
//! base64( bincode( CacheEnvelope { magic, format, checksum, entry } ) )
//! ```
//!
//! where `entry.payload` is the bincode encoding of the table and `checksum`
//! its BLAKE3 hash. Anything that fails validation is treated as a miss and
//! the slot is cleared so the next process does not trip over it again.
//!
//! [`CompiledSlot`] is the in-process counterpart: a single table handle
//! that is swapped atomically when the rules change.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bincode::Options;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::metrics::MetricsCollector;
use crate::error::{AuthzError, Result};
use crate::policy::CompiledPolicyTable;
use crate::store::ScriptStore;

/// Envelope magic bytes
const CACHE_MAGIC: [u8; 4] = *b"RTPC";

/// Envelope format; bump whenever the table layout changes
const CACHE_FORMAT: u16 = 2;

/// Upper bound on decoded sizes
const MAX_CACHE_BYTES: u64 = 16 * 1024 * 1024;

/// Whether the cached compilation succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// Payload holds a valid table
    Ack,
    /// Compilation failed; payload is meaningless
    Error,
}

/// Status plus encoded table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: CacheStatus,
    pub payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    magic: [u8; 4],
    format: u16,
    checksum: [u8; 32],
    entry: CacheEntry,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Valid table for the expected schema version
    Hit(CompiledPolicyTable),
    /// Nothing usable; compile from source
    Miss,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_CACHE_BYTES)
}

fn corruption(what: impl std::fmt::Display) -> AuthzError {
    AuthzError::CacheCorruption(what.to_string())
}

/// Encode a table into slot text
pub fn encode(table: &CompiledPolicyTable) -> Result<String> {
    let payload = codec()
        .serialize(table)
        .map_err(|e| AuthzError::InternalCompile(format!("cannot encode table: {e}")))?;
    let envelope = CacheEnvelope {
        magic: CACHE_MAGIC,
        format: CACHE_FORMAT,
        checksum: *blake3::hash(&payload).as_bytes(),
        entry: CacheEntry {
            status: CacheStatus::Ack,
            payload,
        },
    };
    let bytes = codec()
        .serialize(&envelope)
        .map_err(|e| AuthzError::InternalCompile(format!("cannot encode cache envelope: {e}")))?;
    Ok(STANDARD.encode(bytes))
}

/// Decode slot text produced by [`encode`]
///
/// # Errors
///
/// [`AuthzError::CacheCorruption`] describing the first check that failed.
pub fn decode(text: &str) -> Result<CompiledPolicyTable> {
    let bytes = STANDARD.decode(text.trim()).map_err(|e| corruption(format!("base64: {e}")))?;
    let envelope: CacheEnvelope = codec()
        .deserialize(&bytes)
        .map_err(|e| corruption(format!("envelope: {e}")))?;

    if envelope.magic != CACHE_MAGIC {
        return Err(corruption("bad magic"));
    }
    if envelope.format != CACHE_FORMAT {
        return Err(corruption(format!(
            "format {} (expected {CACHE_FORMAT})",
            envelope.format
        )));
    }
    if envelope.entry.status != CacheStatus::Ack {
        return Err(corruption("status is not ACK"));
    }
    if envelope.entry.payload.is_empty() {
        return Err(corruption("empty payload"));
    }
    if blake3::hash(&envelope.entry.payload).as_bytes() != &envelope.checksum {
        return Err(corruption("checksum mismatch"));
    }

    let table: CompiledPolicyTable = codec()
        .deserialize(&envelope.entry.payload)
        .map_err(|e| corruption(format!("payload: {e}")))?;
    table.check_references().map_err(corruption)?;
    Ok(table)
}

/// Single-slot persistent cache of the compiled table
pub struct CompiledPolicyCache<'a> {
    store: &'a dyn ScriptStore,
    slot: String,
    expected_schema: String,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<'a> CompiledPolicyCache<'a> {
    /// Cache over `slot` of `store`, accepting only tables built for
    /// `expected_schema`
    pub fn new(
        store: &'a dyn ScriptStore,
        slot: impl Into<String>,
        expected_schema: impl Into<String>,
    ) -> Self {
        Self {
            store,
            slot: slot.into(),
            expected_schema: expected_schema.into(),
            metrics: None,
        }
    }

    /// Count hits, misses and corruptions
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Read the cached table
    ///
    /// Never fails: storage errors and invalid contents are logged and
    /// reported as [`CacheLookup::Miss`]. Invalid contents are cleared.
    pub fn load(&self) -> CacheLookup {
        let text = match self.store.get(&self.slot) {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!(slot = %self.slot, "Policy cache slot empty");
                self.record(|m| m.record_cache_miss());
                return CacheLookup::Miss;
            }
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Policy cache slot unreadable");
                self.record(|m| m.record_cache_miss());
                return CacheLookup::Miss;
            }
        };

        let checked = decode(&text).and_then(|table| {
            if table.schema_version == self.expected_schema {
                Ok(table)
            } else {
                Err(corruption(format!(
                    "schema version {} (expected {})",
                    table.schema_version, self.expected_schema
                )))
            }
        });

        match checked {
            Ok(table) => {
                debug!(slot = %self.slot, rules = table.len(), "Policy cache hit");
                self.record(|m| m.record_cache_hit());
                CacheLookup::Hit(table)
            }
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Discarding invalid policy cache");
                self.record(|m| {
                    m.record_cache_corruption();
                    m.record_cache_miss();
                });
                if let Err(e) = self.clear() {
                    warn!(slot = %self.slot, error = %e, "Failed to clear policy cache slot");
                }
                CacheLookup::Miss
            }
        }
    }

    /// Overwrite the slot with `table`
    pub fn store(&self, table: &CompiledPolicyTable) -> Result<()> {
        let text = encode(table)?;
        self.store.set(&self.slot, &text)?;
        info!(slot = %self.slot, rules = table.len(), bytes = text.len(), "Stored compiled policy");
        Ok(())
    }

    /// Empty the slot
    pub fn clear(&self) -> Result<()> {
        self.store.set(&self.slot, "")?;
        debug!(slot = %self.slot, "Cleared policy cache slot");
        Ok(())
    }

    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

/// In-process handle to the active table
///
/// Readers clone the inner `Arc` and keep evaluating against it even if a
/// writer swaps in a new table meanwhile.
#[derive(Debug, Default)]
pub struct CompiledSlot {
    current: RwLock<Arc<CompiledPolicyTable>>,
}

impl CompiledSlot {
    pub fn new(table: CompiledPolicyTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Active table
    pub fn current(&self) -> Arc<CompiledPolicyTable> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new table, returning the previous one
    pub fn replace(&self, table: CompiledPolicyTable) -> Arc<CompiledPolicyTable> {
        std::mem::replace(&mut *self.current.write(), Arc::new(table))
    }
}
