// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document value model.
//!
//! A [`Document`] is an ordered mapping from field name to [`Value`]. Values are
//! scalars, nested documents, sequences, or [`Value::Reference`] markers that
//! point at data living elsewhere in the backing graph store.
//!
//! # Wire Encoding
//!
//! The graph store speaks JSON with three conventions that only exist on the
//! wire and are decoded away here:
//!
//! | Wire form | Decoded as |
//! |-----------|------------|
//! | string starting with `~` | [`Value::Reference`] (key keeps the prefix) |
//! | object with a truthy `_array` field | [`Value::Array`] rebuilt from index keys |
//! | `_` field on any object | dropped (store metadata) |
//!
//! Encoding back to JSON ([`Value::to_json`]) writes arrays as JSON arrays and
//! dates as RFC 3339 strings. References are written with their key so a
//! document can round-trip through a peer, but they never reach query results.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking a string as a reference into the graph store.
pub const REFERENCE_PREFIX: char = '~';

/// Field tagging an object as a sparse, index-keyed array.
pub const ARRAY_MARKER: &str = "_array";

/// Field holding graph store metadata.
pub const METADATA_FIELD: &str = "_";

/// Sparse array indices at or above this are ignored when decoding.
pub const MAX_SPARSE_INDEX: usize = 1 << 16;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Document),
    /// Lazy pointer into the backing store; resolved before matching.
    Reference(String),
}

impl Value {
    /// Decode a wire JSON value, applying the graph store conventions.
    pub fn from_wire(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => {
                if s.starts_with(REFERENCE_PREFIX) {
                    Value::Reference(s)
                } else {
                    Value::String(s)
                }
            }
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_wire).collect())
            }
            serde_json::Value::Object(map) => {
                if map.get(ARRAY_MARKER).map(is_truthy).unwrap_or(false) {
                    Value::Array(decode_sparse_array(map))
                } else {
                    Value::Object(Document::from_wire_map(map))
                }
            }
        }
    }

    /// Convert plain JSON without the wire conventions.
    ///
    /// Used for query literals, where `~x` is just a string.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Encode as plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(doc) => doc.to_json(),
            Value::Reference(key) => serde_json::Value::String(key.clone()),
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Reference(_) => "reference",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Object(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    /// True if this value or anything nested in it is still a reference.
    pub fn contains_reference(&self) -> bool {
        match self {
            Value::Reference(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_reference),
            Value::Object(doc) => doc.values().any(Value::contains_reference),
            _ => false,
        }
    }
}

/// Integral values within the exact f64 range are written as JSON integers.
fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn is_truthy(json: &serde_json::Value) -> bool {
    match json {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Rebuild an array from `{"_array": true, "0": a, "2": c}`.
///
/// Gaps become `Null`. Non-numeric keys and indices at or above
/// [`MAX_SPARSE_INDEX`] are ignored.
fn decode_sparse_array(map: serde_json::Map<String, serde_json::Value>) -> Vec<Value> {
    let mut indexed: Vec<(usize, Value)> = map
        .into_iter()
        .filter(|(key, _)| key != ARRAY_MARKER && key != METADATA_FIELD)
        .filter_map(|(key, value)| match key.parse::<usize>() {
            Ok(i) if i < MAX_SPARSE_INDEX => Some((i, Value::from_wire(value))),
            _ => None,
        })
        .collect();
    indexed.sort_by_key(|(i, _)| *i);

    let len = indexed.last().map(|(i, _)| i + 1).unwrap_or(0);
    let mut items = vec![Value::Null; len];
    for (i, value) in indexed {
        items[i] = value;
    }
    items
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// An ordered mapping from field name to value.
///
/// Field order is insertion order (or wire order when decoded).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", try_from = "serde_json::Value")]
pub struct Document {
    fields: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.fields.retain(|k, v| keep(k, v));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop the graph store's `_` metadata field, if present.
    pub fn strip_metadata(&mut self) {
        self.remove(METADATA_FIELD);
    }

    /// Decode a wire JSON value that must be an object.
    pub fn from_wire(json: serde_json::Value) -> crate::Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_wire_map(map)),
            other => Err(crate::DocMeshError::InvalidDocument(format!(
                "expected object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Convert a plain JSON object, without the wire conventions.
    pub fn from_json(json: &serde_json::Value) -> crate::Result<Self> {
        match Value::from_json(json) {
            Value::Object(doc) => Ok(doc),
            other => Err(crate::DocMeshError::InvalidDocument(format!(
                "expected object, got {}",
                other.type_name()
            ))),
        }
    }

    fn from_wire_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter()
            .filter(|(key, _)| key != METADATA_FIELD)
            .map(|(key, value)| (key, Value::from_wire(value)))
            .collect()
    }

    /// Encode as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        doc.to_json()
    }
}

impl TryFrom<serde_json::Value> for Document {
    type Error = crate::DocMeshError;

    fn try_from(json: serde_json::Value) -> crate::Result<Self> {
        Document::from_wire(json)
    }
}
