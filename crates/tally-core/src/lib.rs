//! # Tally Core
//!
//! Persistence core for Tally - a personal-finance record store that keeps
//! every collection sorted, versioned, diffable and partially encrypted.
//!
//! This crate holds the in-memory data model, history tracking and key
//! hierarchy, independent of any file format or user interface.
//!
//! ## Architecture
//!
//! - **difference**: tri-state comparison outcome
//! - **value**: identifiers and field values
//! - **encrypted**: lazily decrypted encrypted fields
//! - **sorted**: arena-backed sorted list with "all" and "active" views
//! - **versioned**: items with history, lists, differencing, re-keying
//! - **crypto**: passphrase-wrapped key hierarchy and cipher sets
//! - **record**: neutral record representation for storage writers
//! - **bulk** / **cancel**: reports and cooperative cancellation for bulk work

pub mod bulk;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod difference;
pub mod encrypted;
pub mod error;
pub mod record;
pub mod sorted;
pub mod value;
pub mod versioned;

pub use bulk::{BulkReport, ItemError, OperationStatus, Summary};
pub use cancel::{CancelFlag, Cancellation, NeverCancel};
pub use config::{KdfParams, KeyConfig};
pub use crypto::{Algorithm, CipherSet, KeyHierarchy, Sealed, StoredHierarchy};
pub use difference::Difference;
pub use encrypted::EncryptedField;
pub use error::{ErrorKind, Result, TallyError};
pub use record::{Record, RecordField, RecordValue};
pub use sorted::{ListCursor, NodeId, SortedList, View};
pub use value::{FieldId, FieldValue, ItemId, Value};
pub use versioned::{DiffTag, Differences, ListStyle, VersionedItem, VersionedList};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
