//! Flat, storage-ready reading.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name carrying the extraction time (seconds since epoch).
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One normalized reading: field name -> scalar JSON value.
///
/// Absent source properties are simply not present. Serializes as a plain
/// JSON object so a store can write it as a single item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    /// Stamps the record with the extraction time.
    pub fn with_timestamp(mut self, seconds: i64) -> Self {
        self.insert(TIMESTAMP_FIELD, Value::from(seconds));
        self
    }

    /// Right-biased shallow merge: every field of `other` overwrites the
    /// same-named field of `self`, all other fields of `self` are kept.
    pub fn merge(mut self, other: Record) -> Record {
        self.fields.extend(other.fields);
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
