//! Field projection.

use crate::error::{DocMeshError, Result};
use crate::value::Document;
use indexmap::IndexMap;

/// Field name → include flag.
///
/// `true` entries form an allow-list and `false` entries a deny-list. When any
/// field is included, only included fields survive and exclusions are moot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: IndexMap<String, bool>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), true);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), false);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse `{"field": true | false | 1 | 0, ...}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| DocMeshError::query(format!("projection must be an object, got {}", json)))?;

        let mut projection = Projection::new();
        for (field, flag) in map {
            let include = match flag {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                other => {
                    return Err(DocMeshError::query(format!(
                        "projection flag for {} must be a boolean, got {}",
                        field, other
                    )));
                }
            };
            projection.fields.insert(field.clone(), include);
        }
        Ok(projection)
    }

    /// Restrict a document to the projected fields.
    pub fn apply(&self, mut doc: Document) -> Document {
        if self.fields.is_empty() {
            return doc;
        }
        let any_included = self.fields.values().any(|include| *include);
        doc.retain(|field, _| match self.fields.get(field) {
            Some(include) => *include,
            None => !any_included,
        });
        doc
    }
}
