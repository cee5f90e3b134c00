//! Error types for TandemDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using TandemError.
pub type Result<T> = std::result::Result<T, TandemError>;

/// Errors that can occur in TandemDB operations.
#[derive(Debug, Error)]
pub enum TandemError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Block storage errors
    #[error("page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("page {page_id} is corrupted: {reason}")]
    PageCorrupted { page_id: PageId, reason: String },

    #[error("block size mismatch: expected {expected}, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("page cache exhausted, every resident block is pinned")]
    CacheExhausted,

    // Tree errors
    #[error("tree node full")]
    NodeFull,

    #[error("tree corrupted: {0}")]
    TreeCorrupted(String),

    // Contract violations
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}
