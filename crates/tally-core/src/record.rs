//! Neutral record representation handed to and from storage writers.
//!
//! Encrypted fields travel as [`Sealed`] ciphertext, so records can be
//! written and read without the passphrase.

use serde::{Deserialize, Serialize};

use crate::crypto::Sealed;
use crate::value::{FieldId, ItemId, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    pub fields: Vec<RecordField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub field: FieldId,
    pub value: RecordValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordValue {
    Plain(Value),
    Sealed(Sealed),
}

impl Record {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            deleted: false,
            fields: Vec::new(),
        }
    }

    pub fn with_plain(mut self, field: FieldId, value: Value) -> Self {
        self.fields.push(RecordField {
            field,
            value: RecordValue::Plain(value),
        });
        self
    }

    pub fn with_sealed(mut self, field: FieldId, sealed: Sealed) -> Self {
        self.fields.push(RecordField {
            field,
            value: RecordValue::Sealed(sealed),
        });
        self
    }

    pub fn field(&self, field: FieldId) -> Option<&RecordValue> {
        self.fields
            .iter()
            .find(|entry| entry.field == field)
            .map(|entry| &entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Algorithm;

    #[test]
    fn test_json_shape() {
        let record = Record::new(ItemId::new(4))
            .with_plain(FieldId::new(1), Value::Money(1250))
            .with_sealed(
                FieldId::new(2),
                Sealed {
                    algorithm: Algorithm::Aes256Gcm,
                    bytes: vec![1, 2, 3],
                },
            );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 4);
        assert!(json.get("deleted").is_none());
        assert_eq!(json["fields"][0]["value"]["plain"]["type"], "money");
        assert_eq!(json["fields"][1]["value"]["sealed"]["bytes"], "AQID");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_field_lookup() {
        let record = Record::new(ItemId::new(1)).with_plain(FieldId::new(3), Value::Bool(true));
        assert!(matches!(
            record.field(FieldId::new(3)),
            Some(RecordValue::Plain(Value::Bool(true)))
        ));
        assert!(record.field(FieldId::new(4)).is_none());
    }
}
