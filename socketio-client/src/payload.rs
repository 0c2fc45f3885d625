//! Event payload trees with explicit binary leaves.
//!
//! JSON cannot carry raw bytes, so the wire protocol replaces every blob
//! with a numbered `{"_placeholder":true,"num":i}` marker and ships the
//! bytes as trailing websocket binary frames. [`PayloadValue`] is the
//! caller-facing tree where blobs are first-class: callers mark binary data
//! explicitly by building [`PayloadValue::Bytes`] leaves (usually through
//! the `From` conversions), and anything already JSON passes through
//! [`PayloadValue::Json`] untouched.
//!
//! Both traversals (extracting attachments on the way out, substituting
//! them back on the way in) are depth-first walks that rebuild the tree
//! rather than mutating in place.

use serde_json::{json, Map, Value};

/// A JSON superset admitting binary leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// A plain JSON value, passed through unchanged.
    Json(Value),
    /// A binary blob, transmitted as a separate attachment frame.
    Bytes(Vec<u8>),
    Array(Vec<PayloadValue>),
    Object(Vec<(String, PayloadValue)>),
}

impl PayloadValue {
    /// Wrap any serializable value as a JSON (non-binary) payload.
    pub fn json<T: serde::Serialize>(value: T) -> Result<Self, serde_json::Error> {
        Ok(PayloadValue::Json(serde_json::to_value(value)?))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PayloadValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PayloadValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        PayloadValue::Json(value)
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(bytes: Vec<u8>) -> Self {
        PayloadValue::Bytes(bytes)
    }
}

impl From<&[u8]> for PayloadValue {
    fn from(bytes: &[u8]) -> Self {
        PayloadValue::Bytes(bytes.to_vec())
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Json(Value::String(value.to_string()))
    }
}

impl From<Vec<PayloadValue>> for PayloadValue {
    fn from(items: Vec<PayloadValue>) -> Self {
        PayloadValue::Array(items)
    }
}

/// Convert a payload tree into pure JSON plus the attachment vector,
/// numbering placeholders in depth-first visit order. Empty blobs carry no
/// frame and become `null`.
pub fn extract(value: PayloadValue) -> (Value, Vec<Vec<u8>>) {
    let mut bin = Vec::new();
    let tree = walk_extract(value, &mut bin);
    (tree, bin)
}

fn walk_extract(value: PayloadValue, bin: &mut Vec<Vec<u8>>) -> Value {
    match value {
        PayloadValue::Json(v) => v,
        PayloadValue::Bytes(b) if b.is_empty() => Value::Null,
        PayloadValue::Bytes(b) => {
            let num = bin.len();
            bin.push(b);
            json!({ "_placeholder": true, "num": num })
        }
        PayloadValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| walk_extract(item, bin))
                .collect(),
        ),
        PayloadValue::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, walk_extract(value, bin)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// The reverse walk: rebuild the tree substituting every placeholder with
/// the attachment its `num` points at. Subtrees without any placeholder stay
/// plain JSON leaves; a placeholder past the end of the attachment vector
/// degrades to `null`.
pub fn substitute(value: Value, bin: &[Vec<u8>]) -> PayloadValue {
    if let Some(num) = placeholder_num(&value) {
        return match bin.get(num) {
            Some(bytes) => PayloadValue::Bytes(bytes.clone()),
            None => PayloadValue::Json(Value::Null),
        };
    }
    if count_placeholders(&value) == 0 {
        return PayloadValue::Json(value);
    }
    match value {
        Value::Array(items) => PayloadValue::Array(
            items
                .into_iter()
                .map(|item| substitute(item, bin))
                .collect(),
        ),
        Value::Object(map) => PayloadValue::Object(
            map.into_iter()
                .map(|(key, value)| (key, substitute(value, bin)))
                .collect(),
        ),
        v => PayloadValue::Json(v),
    }
}

/// How many placeholders a decoded JSON tree announces.
pub fn count_placeholders(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.iter().map(count_placeholders).sum(),
        Value::Object(_) if placeholder_num(value).is_some() => 1,
        Value::Object(map) => map.values().map(count_placeholders).sum(),
        _ => 0,
    }
}

fn placeholder_num(value: &Value) -> Option<usize> {
    let map = value.as_object()?;
    if map.get("_placeholder")?.as_bool()? {
        map.get("num")?.as_u64().map(|num| num as usize)
    } else {
        None
    }
}
