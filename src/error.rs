//! Error types for index operations.

use thiserror::Error;

/// Errors surfaced by the storage substrate and the tree facades.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool exhausted: every frame is pinned")]
    PoolExhausted,

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("polygon has {needed} rectangles but the slot holds at most {capacity}")]
    PolygonOverflow { needed: usize, capacity: usize },
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
