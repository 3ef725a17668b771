//! Multi-key document ordering.
//!
//! Keys are compared left to right and the first non-equal comparison wins.
//! Values of the same type compare naturally; strings use [`collate`], a
//! locale-style order where `a < A < b < B < é < f`. Values of different types,
//! and missing fields, fall back to a fixed rank so the order stays total:
//!
//! ```text
//! number < date < string < bool < null < array/object < missing
//! ```
//!
//! Range bounds in queries use [`compare_same_type`] instead, which orders
//! strings by code point.

use crate::error::{DocMeshError, Result};
use crate::value::{Document, Value};
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordered (field, direction) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    keys: Vec<(String, Direction)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Descending));
        self
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parse `{"field": 1 | -1 | "asc" | "desc", ...}`, keeping key order.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| DocMeshError::query(format!("sort spec must be an object, got {}", json)))?;

        let mut spec = SortSpec::new();
        for (field, direction) in map {
            let direction = match direction {
                serde_json::Value::Number(n) if n.as_f64() == Some(1.0) => Direction::Ascending,
                serde_json::Value::Number(n) if n.as_f64() == Some(-1.0) => Direction::Descending,
                serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "asc" | "ascending" => Direction::Ascending,
                    "desc" | "descending" => Direction::Descending,
                    _ => return Err(invalid_direction(field, direction)),
                },
                _ => return Err(invalid_direction(field, direction)),
            };
            spec.keys.push((field.clone(), direction));
        }
        Ok(spec)
    }

    /// Compare two documents under this spec.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, direction) in &self.keys {
            let ord = compare_field(a.get(field), b.get(field));
            let ord = match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn invalid_direction(field: &str, direction: &serde_json::Value) -> DocMeshError {
    DocMeshError::query(format!(
        "sort direction for {} must be 1, -1, \"asc\" or \"desc\", got {}",
        field, direction
    ))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(_)) => 0,
        Some(Value::Date(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Bool(_)) => 3,
        Some(Value::Null) => 4,
        Some(Value::Array(_) | Value::Object(_) | Value::Reference(_)) => 5,
        None => 6,
    }
}

/// Total order over optional field values.
pub fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.total_cmp(y),
        (Some(Value::Date(x)), Some(Value::Date(y))) => x.cmp(y),
        (Some(Value::String(x)), Some(Value::String(y))) => collate(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Locale-style string order.
///
/// Levels, each consulted only when the previous one ties:
///
/// 1. base letters, ignoring case and accents
/// 2. accents
/// 3. case, lowercase first
/// 4. code points
pub fn collate(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(base_letters(b))
        .then_with(|| accented(a).cmp(accented(b)))
        .then_with(|| case_marks(a).cmp(case_marks(b)))
        .then_with(|| a.cmp(b))
}

fn base_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase)
}

fn accented(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().flat_map(char::to_lowercase)
}

fn case_marks(s: &str) -> impl Iterator<Item = bool> + '_ {
    s.nfd().filter(|c| !is_combining_mark(*c)).map(char::is_uppercase)
}

/// Ordering between two values of the same comparable type.
///
/// `None` for mixed types, non-comparable types and NaN.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
