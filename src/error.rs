//! Core error taxonomy
//!
//! Every failure is scoped to the single operation that raised it and is
//! surfaced to the immediate caller as a typed variant with a readable
//! message. Nothing is retried internally; retry is a caller concern.

use thiserror::Error;

/// Failures raised by the ingestion, scoring, and prompt boundaries
#[derive(Debug, Error)]
pub enum CoreError {
    /// Empty or malformed input: an empty chunk, a bad record, an invalid
    /// status transition
    #[error("validation error: {0}")]
    Validation(String),

    /// A message with this (conversation_id, message_index) was already
    /// ingested; the same chunk was submitted twice
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The referenced job, user, or profile does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider returned no usable structured output
    #[error("generation error: {0}")]
    Generation(String),

    /// Generic storage gateway failure
    #[error("storage error: {0}")]
    Storage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for CoreError {
    fn from(e: r2d2::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}
