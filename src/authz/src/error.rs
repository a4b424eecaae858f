//! Error types for the policy compiler, cache and authorization engine

use std::fmt;
use thiserror::Error;

/// Location-carrying rule language syntax error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset into the rule source
    pub offset: usize,

    /// 1-based line number
    pub line: usize,

    /// 1-based column number (in characters)
    pub column: usize,

    /// Human readable description
    pub message: String,
}

impl SyntaxError {
    /// Create a syntax error at `offset` within `source`
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let prefix = &source[..offset];
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = prefix[line_start..].chars().count() + 1;

        Self {
            offset,
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed rule text
    #[error("Syntax error at {0}")]
    Syntax(#[from] SyntaxError),

    /// Parser accepted input that the table builder cannot resolve
    #[error("Internal compile error: {0}")]
    InternalCompile(String),

    /// Compiled cache blob could not be used
    #[error("Compiled policy cache corrupted: {0}")]
    CacheCorruption(String),

    /// Rule, tag or account store unreachable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Persisted schema does not match the running code
    #[error("Schema version mismatch: expected {expected}, found {found}; an administrative upgrade is required")]
    SchemaMismatch {
        /// Version this build was made for
        expected: String,
        /// Version found in storage
        found: String,
    },

    /// Tag parent assignment forms a cycle
    #[error("Tag hierarchy cycle: {0}")]
    TagCycle(String),

    /// Malformed tag list
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

impl From<sled::Error> for AuthzError {
    fn from(err: sled::Error) -> Self {
        AuthzError::StorageUnavailable(err.to_string())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
