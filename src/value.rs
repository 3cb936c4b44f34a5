//! Loosely typed field values and the per-document records built from them.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// Field name -> value for one document, in the order fields were first seen.
pub type DocumentRecord = IndexMap<String, FieldValue>;

/// Document id -> record for a whole ground-truth or prediction file.
pub type Dataset = IndexMap<String, DocumentRecord>;

/// A single extracted or expected field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Number),
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Converts a JSON value that sits in a field position.
    ///
    /// Arrays and objects cannot be compared field-by-field at this point, so
    /// they are kept as their compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Number(n) => FieldValue::Number(n.clone()),
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            Value::Array(_) | Value::Object(_) => FieldValue::Text(value.to_string()),
        }
    }

    /// Textual form used for exact matching, normalization and reports.
    pub fn raw_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Null => String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(_) => false,
            FieldValue::Null => true,
        }
    }
}

/// Outcome of trying to read a field value as embedded JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    /// Entries to merge into the enclosing record.
    Nested(Vec<(String, FieldValue)>),
    Scalar(FieldValue),
}

/// Expands a string cell holding a serialized JSON object (or array of
/// objects) into nested entries. Everything else, including strings that only
/// look like JSON, comes back as a scalar.
pub fn try_parse_nested(value: &Value) -> ParsedValue {
    match value {
        Value::Object(map) => ParsedValue::Nested(entries(map)),
        Value::String(s) => {
            let trimmed = s.trim();
            let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
                || (trimmed.starts_with('[') && trimmed.ends_with(']'));
            if !bracketed {
                return ParsedValue::Scalar(FieldValue::from_json(value));
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => ParsedValue::Nested(entries(&map)),
                Ok(Value::Array(items)) => expand_array(&items)
                    .unwrap_or_else(|| ParsedValue::Scalar(FieldValue::from_json(value))),
                _ => ParsedValue::Scalar(FieldValue::from_json(value)),
            }
        }
        _ => ParsedValue::Scalar(FieldValue::from_json(value)),
    }
}

/// Only a non-empty array of objects expands; any other array keeps the
/// string it came from.
fn expand_array(items: &[Value]) -> Option<ParsedValue> {
    if items.is_empty() || !items.iter().all(Value::is_object) {
        return None;
    }
    let merged = items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(entries)
        .collect();
    Some(ParsedValue::Nested(merged))
}

fn entries(map: &Map<String, Value>) -> Vec<(String, FieldValue)> {
    map.iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
        .collect()
}

/// Adds one raw field to `record`.
///
/// Nested entries never overwrite a key that is already present; a scalar is
/// stored under its own key and replaces any earlier value.
pub fn merge_field(record: &mut DocumentRecord, key: &str, value: &Value) {
    match try_parse_nested(value) {
        ParsedValue::Nested(nested) => {
            for (nested_key, nested_value) in nested {
                record.entry(nested_key).or_insert(nested_value);
            }
        }
        ParsedValue::Scalar(scalar) => {
            record.insert(key.to_string(), scalar);
        }
    }
}
