use std::sync::Arc;

use crate::bulk::BulkReport;
use crate::cancel::Cancellation;
use crate::crypto::CipherSet;
use crate::encrypted::EncryptedField;
use crate::error::{Result, TallyError};
use crate::record::{Record, RecordField, RecordValue};
use crate::sorted::View;
use crate::value::FieldValue;

use super::item::VersionedItem;
use super::list::{ListStyle, VersionedList};

impl VersionedList {
    /// Load records as untracked items at the current generation.
    ///
    /// Sealed values need `cipher`; their algorithm must be one the set
    /// holds. Decryption itself is deferred to first access. Malformed or
    /// duplicate records are collected in the report.
    pub fn load<I>(&mut self, records: I, cipher: Option<&Arc<CipherSet>>, cancel: &dyn Cancellation) -> Result<BulkReport>
    where
        I: IntoIterator<Item = Record>,
    {
        if self.style() == ListStyle::Difference {
            return Err(TallyError::IllegalState(
                "difference lists are derived, not loaded".to_string(),
            ));
        }

        let mut report = BulkReport::default();
        for record in records {
            if cancel.is_cancelled() {
                report.mark_cancelled();
                break;
            }
            report.processed += 1;
            let id = record.id;
            match self.item_from_record(record, cipher) {
                Ok(item) => match self.add_item(item) {
                    Ok(()) => report.added += 1,
                    Err(e) => report.record_error(Some(id), e),
                },
                Err(e) => report.record_error(Some(id), e),
            }
        }
        tracing::info!(
            style = %self.style(),
            loaded = report.added,
            errors = report.errors.len(),
            cancelled = report.is_cancelled(),
            "records loaded"
        );
        Ok(report)
    }

    /// Export every item, encrypting stale fields first.
    pub fn to_records(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.len());
        for node in self.nodes() {
            let Some(item) = self.item_mut(node) else {
                continue;
            };
            item.materialize()?;
            records.push(record_from_item(item)?);
        }
        Ok(records)
    }

    /// Export without touching stale ciphertext; fails if any is stale.
    pub fn records(&self) -> Result<Vec<Record>> {
        self.iter(View::All).map(record_from_item).collect()
    }

    fn item_from_record(&self, record: Record, cipher: Option<&Arc<CipherSet>>) -> Result<VersionedItem> {
        let mut item = VersionedItem::new(record.id, self.generation());
        item.set_deleted(record.deleted, self.generation());
        for RecordField { field, value } in record.fields {
            let value = match value {
                RecordValue::Plain(value) => FieldValue::Plain(value),
                RecordValue::Sealed(sealed) => {
                    let cipher = cipher.ok_or_else(|| {
                        TallyError::Data(format!("field {} is encrypted but no keys are available", field))
                    })?;
                    if !cipher.algorithms().any(|held| held == sealed.algorithm) {
                        return Err(TallyError::Security(format!(
                            "field {} uses {} which the key hierarchy does not hold",
                            field, sealed.algorithm
                        )));
                    }
                    FieldValue::Encrypted(EncryptedField::from_sealed(cipher, sealed))
                }
            };
            if item.set_field(field, value).is_some() {
                return Err(TallyError::Data(format!("field {} appears twice", field)));
            }
        }
        Ok(item)
    }
}

fn record_from_item(item: &VersionedItem) -> Result<Record> {
    let mut record = Record::new(item.id());
    record.deleted = item.is_deleted();
    for (field, value) in item.fields() {
        let value = match value {
            FieldValue::Plain(value) => RecordValue::Plain(value.clone()),
            FieldValue::Encrypted(encrypted) => {
                let sealed = encrypted.sealed().ok_or_else(|| {
                    TallyError::IllegalState(format!(
                        "item {} field {} has stale ciphertext",
                        item.id(),
                        field
                    ))
                })?;
                RecordValue::Sealed(sealed.clone())
            }
        };
        record.fields.push(RecordField { field, value });
    }
    Ok(record)
}
