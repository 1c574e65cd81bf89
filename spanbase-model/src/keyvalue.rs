use serde::{Deserialize, Serialize};

/// The typed payload of a [`KeyValue`].
///
/// Tag equality is typed: two numeric values of different variants are never
/// equal, and no string coercion happens anywhere in the query path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TagValue {
    String(String),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Binary(Vec<u8>),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int64(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float64(value)
    }
}

/// A single typed key-value pair attached to a span, process or log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: TagValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for string tags, the most common kind.
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: TagValue::String(value.into()),
        }
    }

    /// The value as `&str` if this is a string tag.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Stable sort of a tag list, ascending by key. Equal keys keep their
/// relative order.
pub fn sort_by_key(tags: &mut [KeyValue]) {
    tags.sort_by(|a, b| a.key.cmp(&b.key));
}
