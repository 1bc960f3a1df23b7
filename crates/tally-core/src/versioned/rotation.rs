use std::sync::Arc;

use crate::bulk::BulkReport;
use crate::cancel::Cancellation;
use crate::crypto::CipherSet;
use crate::error::{Result, TallyError};
use crate::value::FieldValue;

use super::list::VersionedList;

impl VersionedList {
    /// Re-encrypt every encrypted field under `target`.
    ///
    /// Each item is migrated as a tracked edit (security-only change) or not
    /// at all. Cancellation is checked before each item; on cancellation the
    /// items already visited stay migrated and the report is tagged
    /// cancelled.
    pub fn rekey(&mut self, target: &Arc<CipherSet>, cancel: &dyn Cancellation) -> Result<BulkReport> {
        if target.is_empty() {
            return Err(TallyError::IllegalState(
                "target cipher set has no keys".to_string(),
            ));
        }

        let generation = self.generation();
        let mut report = BulkReport::default();
        for node in self.nodes() {
            if cancel.is_cancelled() {
                report.mark_cancelled();
                break;
            }
            let Some(item) = self.item_mut(node) else {
                continue;
            };
            report.processed += 1;
            if !item.has_encrypted_fields() {
                continue;
            }
            let id = item.id();

            let migrated: Result<Vec<_>> = item
                .encrypted_fields()
                .map(|(field, encrypted)| {
                    let mut copy = encrypted.clone();
                    copy.rekey(target)?;
                    Ok((field, copy))
                })
                .collect();
            let migrated = match migrated {
                Ok(migrated) => migrated,
                Err(e) => {
                    report.record_error(Some(id), e);
                    continue;
                }
            };

            if let Err(e) = item.push_history(generation) {
                report.record_error(Some(id), e);
                continue;
            }
            for (field, encrypted) in migrated {
                item.set_field(field, FieldValue::Encrypted(encrypted));
            }
            match item.check_for_history() {
                Ok(difference) if !difference.is_identical() => report.changed += 1,
                Ok(_) => {}
                Err(e) => report.record_error(Some(id), e),
            }
            tracing::debug!(item = %id, "item re-keyed");
        }
        Ok(report)
    }
}
