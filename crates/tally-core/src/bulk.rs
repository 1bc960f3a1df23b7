//! Reports for bulk operations (load, diff, re-key).
//!
//! Per-item failures are collected instead of aborting the batch so the
//! caller can show a summary and let the user inspect each failure.

use serde::Serialize;

use crate::error::{ErrorKind, TallyError};
use crate::value::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Completed,
    Cancelled,
}

/// A failure attached to one item.
#[derive(Debug)]
pub struct ItemError {
    pub id: Option<ItemId>,
    pub error: TallyError,
}

impl ItemError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[derive(Debug, Default)]
pub struct BulkReport {
    pub status: OperationStatus,
    /// Items visited (successfully or not).
    pub processed: usize,
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
    pub errors: Vec<ItemError>,
}

/// Counts only, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub status: OperationStatus,
    pub processed: usize,
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
    pub errored: usize,
}

impl BulkReport {
    pub(crate) fn record_error(&mut self, id: Option<ItemId>, error: TallyError) {
        match id {
            Some(id) => tracing::warn!(item = %id, error = %error, "item failed"),
            None => tracing::warn!(error = %error, "record failed"),
        }
        self.errors.push(ItemError { id, error });
    }

    pub(crate) fn mark_cancelled(&mut self) {
        tracing::info!(processed = self.processed, "bulk operation cancelled");
        self.status = OperationStatus::Cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OperationStatus::Cancelled
    }

    /// Completed with no per-item failures.
    pub fn is_clean(&self) -> bool {
        !self.is_cancelled() && self.errors.is_empty()
    }

    /// Fold another report into this one; cancellation is sticky.
    pub fn merge(&mut self, other: BulkReport) {
        if other.is_cancelled() {
            self.status = OperationStatus::Cancelled;
        }
        self.processed += other.processed;
        self.added += other.added;
        self.changed += other.changed;
        self.deleted += other.deleted;
        self.errors.extend(other.errors);
    }

    pub fn summary(&self) -> Summary {
        Summary {
            status: self.status,
            processed: self.processed,
            added: self.added,
            changed: self.changed,
            deleted: self.deleted,
            errored: self.errors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_and_keeps_cancel() {
        let mut first = BulkReport {
            processed: 2,
            changed: 1,
            ..Default::default()
        };
        let mut second = BulkReport {
            processed: 3,
            added: 1,
            ..Default::default()
        };
        second.record_error(Some(ItemId::new(9)), TallyError::Data("bad".to_string()));
        second.mark_cancelled();

        first.merge(second);
        let summary = first.summary();
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.status, OperationStatus::Cancelled);
        assert!(!first.is_clean());
        assert_eq!(first.errors[0].kind(), ErrorKind::Data);
    }

    #[test]
    fn test_default_is_clean() {
        assert!(BulkReport::default().is_clean());
    }
}
