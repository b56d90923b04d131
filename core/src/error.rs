use std::path::PathBuf;
use thiserror::Error;

/// Malformed query syntax. `position` is the byte offset of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at position {position}")]
pub struct QueryError {
    pub reason: String,
    pub position: usize,
}

impl QueryError {
    pub fn new(reason: impl Into<String>, position: usize) -> Self {
        Self { reason: reason.into(), position }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("already indexing {}", root.display())]
    AlreadyIndexing { root: PathBuf },

    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("index data is corrupt: {0}")]
    Corrupt(String),

    #[error("indexing task failed: {0}")]
    Task(String),

    #[error("index was cleared before the write was committed (generation {generation})")]
    Cleared { generation: u64 },

    #[error("not in the index: {}", .0.display())]
    NotIndexed(PathBuf),
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Corrupt(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Corrupt(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
