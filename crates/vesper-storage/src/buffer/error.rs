//! Buffer pool errors.

use thiserror::Error;
use vesper_common::types::PageId;

use crate::disk::IoError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
///
/// Ordinary "not there" outcomes (unknown page, all frames pinned) are
/// reported as `Ok(false)` / `Ok(None)` by the pool, not as errors.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BufferError {
    /// Invalid page ID passed where a valid one is required.
    #[error("invalid page ID: {page_id}")]
    InvalidPageId { page_id: PageId },

    /// I/O error during page read or write-back.
    #[error("page I/O failed: {0}")]
    Io(#[from] IoError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
