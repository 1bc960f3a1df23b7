//! Versioned items and lists.
//!
//! - **item**: [`VersionedItem`] and its tracked-edit protocol
//! - **history**: snapshot stack
//! - **list**: [`VersionedList`], generations and tracked list edits
//! - **diff**: list-to-list differencing and applying edit lists
//! - **rotation**: re-encrypting every protected field under new keys
//! - **records**: conversion to and from [`Record`](crate::record::Record)

mod diff;
mod history;
mod item;
mod list;
mod records;
mod rotation;

pub use diff::{DiffTag, Differences};
pub use history::{FieldSnapshot, History};
pub use item::VersionedItem;
pub use list::{by_field, by_id, ItemComparator, ListStyle, VersionedList};
