use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Number, Value};

/// A single attribute value materialized from a columnar row.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    List(Vec<RecordValue>),
    Map(Record),
}

impl RecordValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordValue::Null => "null",
            RecordValue::Bool(_) => "a boolean",
            RecordValue::Int(_) | RecordValue::UInt(_) => "an integer",
            RecordValue::Float(_) => "a float",
            RecordValue::String(_) => "a string",
            RecordValue::Binary(_) => "binary",
            RecordValue::List(_) => "a list",
            RecordValue::Map(_) => "a map",
        }
    }

    /// Non-finite floats have no JSON form and become `null`; binary becomes base64.
    pub fn into_json(self) -> Value {
        match self {
            RecordValue::Null => Value::Null,
            RecordValue::Bool(val) => Value::Bool(val),
            RecordValue::Int(val) => Value::from(val),
            RecordValue::UInt(val) => Value::from(val),
            RecordValue::Float(val) => Number::from_f64(val).map_or(Value::Null, Value::Number),
            RecordValue::String(val) => Value::String(val),
            RecordValue::Binary(bytes) => Value::String(STANDARD.encode(bytes)),
            RecordValue::List(items) => {
                Value::Array(items.into_iter().map(RecordValue::into_json).collect())
            }
            RecordValue::Map(record) => Value::Object(
                record
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        RecordValue::String(value.to_string())
    }
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        RecordValue::Int(value)
    }
}

impl From<f64> for RecordValue {
    fn from(value: f64) -> Self {
        RecordValue::Float(value)
    }
}

impl From<bool> for RecordValue {
    fn from(value: bool) -> Self {
        RecordValue::Bool(value)
    }
}

impl From<Record> for RecordValue {
    fn from(value: Record) -> Self {
        RecordValue::Map(value)
    }
}

/// Column-ordered key/value record. Keys are unique; inserting an existing key
/// replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, RecordValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RecordValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<RecordValue> {
        let index = self.fields.iter().position(|(existing, _)| existing == key)?;
        Some(self.fields.remove(index).1)
    }
}

#[cfg(test)]
impl Record {
    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>> FromIterator<(K, RecordValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, RecordValue)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, RecordValue);
    type IntoIter = std::vec::IntoIter<(String, RecordValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
