//! Field values and identifiers.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::difference::Difference;
use crate::encrypted::EncryptedField;
use crate::error::Result;

/// Identifier of an item, unique within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u32);

impl ItemId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a field within an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(u16);

impl FieldId {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plain (unencrypted) field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Integer(i64),
    /// Signed amount in minor currency units.
    Money(i64),
    Text(String),
    Date(NaiveDate),
    /// Reference to another item.
    Link(ItemId),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_money(&self) -> Option<i64> {
        match self {
            Value::Money(amount) => Some(*amount),
            _ => None,
        }
    }

    /// Parse a `kind:value` literal, e.g. `money:1250` or `date:2024-01-31`.
    /// A literal without a kind prefix is taken as text.
    pub fn parse_literal(input: &str) -> Result<Value> {
        use crate::error::TallyError;

        let Some((kind, raw)) = input.split_once(':') else {
            return Ok(Value::Text(input.to_string()));
        };
        let invalid = |what: &str| TallyError::InvalidInput(format!("Invalid {} literal: {}", what, raw));
        match kind {
            "bool" => raw.parse().map(Value::Bool).map_err(|_| invalid("bool")),
            "int" => raw.parse().map(Value::Integer).map_err(|_| invalid("integer")),
            "money" => raw.parse().map(Value::Money).map_err(|_| invalid("money")),
            "date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| invalid("date")),
            "link" => raw
                .parse()
                .map(|id| Value::Link(ItemId::new(id)))
                .map_err(|_| invalid("link")),
            "text" => Ok(Value::Text(raw.to_string())),
            _ => Ok(Value::Text(input.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Money(minor) => {
                let sign = if *minor < 0 { "-" } else { "" };
                let abs = minor.unsigned_abs();
                write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
            }
            Value::Text(value) => write!(f, "{}", value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Link(id) => write!(f, "#{}", id),
        }
    }
}

/// A field as held by an item: plain or protected.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Plain(Value),
    Encrypted(EncryptedField),
}

impl FieldValue {
    /// The plaintext value, decrypting if required.
    pub fn value(&self) -> Result<&Value> {
        match self {
            FieldValue::Plain(value) => Ok(value),
            FieldValue::Encrypted(field) => field.get(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, FieldValue::Encrypted(_))
    }

    /// Copy suitable for a history snapshot: encrypted fields keep only
    /// their plaintext and cipher set reference.
    pub(crate) fn snapshot(&self) -> Result<FieldValue> {
        match self {
            FieldValue::Plain(value) => Ok(FieldValue::Plain(value.clone())),
            FieldValue::Encrypted(field) => field.detached().map(FieldValue::Encrypted),
        }
    }

    /// Compare two optional field values on plaintext.
    pub fn difference(left: Option<&FieldValue>, right: Option<&FieldValue>) -> Result<Difference> {
        match (left, right) {
            (None, None) => Ok(Difference::Identical),
            (None, Some(_)) | (Some(_), None) => Ok(Difference::ValueChanged),
            (Some(FieldValue::Plain(a)), Some(FieldValue::Plain(b))) => Ok(Difference::of(a, b)),
            (Some(FieldValue::Encrypted(a)), Some(FieldValue::Encrypted(b))) => a.difference(b),
            (Some(FieldValue::Plain(plain)), Some(FieldValue::Encrypted(enc)))
            | (Some(FieldValue::Encrypted(enc)), Some(FieldValue::Plain(plain))) => {
                if enc.get()? == plain {
                    Ok(Difference::SecurityChanged)
                } else {
                    Ok(Difference::ValueChanged)
                }
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Plain(value)
    }
}

impl From<EncryptedField> for FieldValue {
    fn from(field: EncryptedField) -> Self {
        FieldValue::Encrypted(field)
    }
}
