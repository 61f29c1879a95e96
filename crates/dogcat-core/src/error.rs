//! Error types for dogcat-core.
//!
//! User errors (the first block below) are caught at the API boundary and
//! returned to the caller without mutating the store. `MalformedRecord` and
//! `Io` are fatal: they abort store construction or propagate with context.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("issue already exists: {0}")]
    DuplicateId(String),

    #[error("ambiguous id '{partial}' matches {} issues: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousId {
        partial: String,
        candidates: Vec<String>,
    },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("dependency cycle detected: {0} -> {1} would close a cycle")]
    CycleDetected(String, String),

    #[error("store not initialized at {0}. Run 'dcat init' first.")]
    NotInitialized(String),

    #[error("store already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("lock acquisition failed: {0}")]
    Lock(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
