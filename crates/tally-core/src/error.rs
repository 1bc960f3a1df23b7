//! Error types for Tally core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI layer will map these
//! to user-friendly messages and exit codes.

use thiserror::Error;

use crate::value::ItemId;

/// Result type alias for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Core error type for Tally operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Malformed persisted value or unresolvable reference
    #[error("Data error: {0}")]
    Data(String),

    /// Incorrect passphrase while unwrapping a master hash
    #[error("Incorrect passphrase")]
    IncorrectPassphrase,

    /// Unwrap/decrypt failure or unknown algorithm tag
    #[error("Security error: {0}")]
    Security(String),

    /// Item id collision
    #[error("Duplicate item id: {0}")]
    Duplicate(ItemId),

    /// A cursor referred to a node that is no longer in the list
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation called in the wrong state (e.g. cursor remove before next)
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Item not found by id
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Coarse classification used when summarising collected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Data,
    Security,
    Duplicate,
    ConcurrentModification,
    Cancelled,
    IllegalState,
    NotFound,
    InvalidInput,
}

impl TallyError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::Data(_) | TallyError::Json { .. } => ErrorKind::Data,
            TallyError::IncorrectPassphrase | TallyError::Security(_) => ErrorKind::Security,
            TallyError::Duplicate(_) => ErrorKind::Duplicate,
            TallyError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            TallyError::Cancelled => ErrorKind::Cancelled,
            TallyError::IllegalState(_) => ErrorKind::IllegalState,
            TallyError::ItemNotFound(_) => ErrorKind::NotFound,
            TallyError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether this error means no protected field can be read.
    pub fn is_security(&self) -> bool {
        self.kind() == ErrorKind::Security
    }
}
