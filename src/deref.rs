// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reference resolution.
//!
//! Documents may carry [`Value::Reference`] markers pointing at data stored
//! elsewhere in the graph. Before a document can be matched or sorted every
//! reference is replaced by the value it points at:
//!
//! ```text
//! {name: "a", profile: ~p1}
//!            │
//!            ▼ store.resolve("~p1")          (bounded by resolve_timeout)
//! {name: "a", profile: {bio: "...", avatar: ~img}}
//!                                     │
//!                                     ▼ resolved values are resolved again
//! {name: "a", profile: {bio: "...", avatar: {...}}}
//! ```
//!
//! A key with nothing stored behind it resolves to `Null`. Chains deeper than
//! `max_reference_depth` fail with [`DocMeshError::Dereference`], which also
//! stops reference cycles.

use crate::config::QueryConfig;
use crate::error::{DocMeshError, Result};
use crate::store::GraphStore;
use crate::value::{Document, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Resolves references inside documents through a [`GraphStore`].
pub struct Dereferencer<S: GraphStore> {
    store: Arc<S>,
    timeout: Duration,
    max_depth: usize,
}

impl<S: GraphStore> Dereferencer<S> {
    pub fn new(store: Arc<S>, config: &QueryConfig) -> Self {
        Self {
            store,
            timeout: config.resolve_timeout_duration(),
            max_depth: config.max_reference_depth,
        }
    }

    /// Replace every reference in the document with its resolved value.
    pub async fn resolve_document(&self, doc: Document) -> Result<Document> {
        let mut resolved = Document::new();
        for (field, value) in doc {
            let value = self.resolve_value(value, 0).await?;
            resolved.insert(field, value);
        }
        Ok(resolved)
    }

    /// Resolve a single value. `depth` counts the references followed so far.
    pub fn resolve_value(&self, value: Value, depth: usize) -> ResolveFuture<'_> {
        Box::pin(async move {
            match value {
                Value::Reference(key) => {
                    if depth >= self.max_depth {
                        return Err(DocMeshError::Dereference {
                            key,
                            message: format!("reference chain deeper than {}", self.max_depth),
                        });
                    }
                    let fetched = self.fetch(&key).await?;
                    match fetched {
                        Some(json) => self.resolve_value(Value::from_wire(json), depth + 1).await,
                        None => {
                            debug!(key = %key, "Reference points at nothing, using null");
                            Ok(Value::Null)
                        }
                    }
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item, depth).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Object(doc) => {
                    let mut resolved = Document::new();
                    for (field, value) in doc {
                        let value = self.resolve_value(value, depth).await?;
                        resolved.insert(field, value);
                    }
                    Ok(Value::Object(resolved))
                }
                scalar => Ok(scalar),
            }
        })
    }

    async fn fetch(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let result = tokio::time::timeout(self.timeout, self.store.resolve(key)).await;
        match result {
            Ok(Ok(found)) => {
                trace!(key = %key, found = found.is_some(), "Reference lookup complete");
                crate::metrics::record_reference_resolution(if found.is_some() {
                    "resolved"
                } else {
                    "missing"
                });
                Ok(found)
            }
            Ok(Err(e)) => {
                crate::metrics::record_reference_resolution("error");
                Err(DocMeshError::Dereference {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                crate::metrics::record_reference_resolution("error");
                Err(DocMeshError::Dereference {
                    key: key.to_string(),
                    message: format!("lookup timed out after {:?}", self.timeout),
                })
            }
        }
    }
}
