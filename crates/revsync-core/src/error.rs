//! Error types for revsync core.

use thiserror::Error;

/// Errors raised while encoding or decoding core records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
