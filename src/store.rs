// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing store integration traits.
//!
//! docmesh does not implement the encrypted graph store or its cryptography.
//! It consumes them through two narrow seams:
//!
//! - [`GraphStore`]: read a collection snapshot, resolve a reference key
//! - [`Cipher`]: decrypt an [`EncryptedRecord`] with an [`EncryptionKey`]
//!
//! [`MemoryStore`] and [`JsonCipher`] are standalone implementations for
//! development and tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use docmesh::store::{BoxFuture, EncryptedRecord, GraphStore};
//!
//! struct MyGraph { /* ... */ }
//!
//! impl GraphStore for MyGraph {
//!     fn collection(&self, _name: &str) -> BoxFuture<'_, Option<Vec<(String, EncryptedRecord)>>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn resolve(&self, _key: &str) -> BoxFuture<'_, Option<serde_json::Value>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//! }
//! ```

use crate::value::Document;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

/// Result type for collaborator operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Simplified error for store and cipher operations.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Opaque encrypted form of a document as held by the graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord(String);

impl EncryptedRecord {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Symmetric key handed to the [`Cipher`]. Never printed.
#[derive(Clone)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// What the query engine needs from the graph store.
pub trait GraphStore: Send + Sync + 'static {
    /// Read the whole keyed mapping of a collection in one snapshot.
    ///
    /// Returns `None` when the collection does not exist. Entry order is the
    /// scan order used by unsorted queries.
    fn collection(&self, name: &str) -> BoxFuture<'_, Option<Vec<(String, EncryptedRecord)>>>;

    /// Fetch the value stored under a reference key, in wire form.
    ///
    /// Returns `None` when nothing lives at the key.
    fn resolve(&self, key: &str) -> BoxFuture<'_, Option<serde_json::Value>>;
}

/// Decryption capability. Implementations wrap the store's real cryptography.
pub trait Cipher: Send + Sync + 'static {
    fn decrypt(&self, record: &EncryptedRecord, key: &EncryptionKey) -> StoreResult<Document>;
}

impl<F> Cipher for F
where
    F: Fn(&EncryptedRecord, &EncryptionKey) -> StoreResult<Document> + Send + Sync + 'static,
{
    fn decrypt(&self, record: &EncryptedRecord, key: &EncryptionKey) -> StoreResult<Document> {
        self(record, key)
    }
}

/// Pass-through cipher: records are plain JSON documents and the key is ignored.
///
/// For development data that was never encrypted.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCipher;

impl Cipher for JsonCipher {
    fn decrypt(&self, record: &EncryptedRecord, _key: &EncryptionKey) -> StoreResult<Document> {
        let json: serde_json::Value =
            serde_json::from_str(record.as_str()).map_err(|e| StoreError(e.to_string()))?;
        Document::from_wire(json).map_err(|e| StoreError(e.to_string()))
    }
}

/// In-memory graph store for standalone mode and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(String, EncryptedRecord)>>>,
    nodes: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a collection, creating the collection if needed.
    ///
    /// Re-inserting an existing id replaces the record in place.
    pub fn insert_record(&self, collection: &str, id: &str, record: EncryptedRecord) {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let entries = collections.entry(collection.to_string()).or_default();
        match entries.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => slot.1 = record,
            None => entries.push((id.to_string(), record)),
        }
    }

    /// Create an empty collection.
    pub fn create_collection(&self, collection: &str) {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.entry(collection.to_string()).or_default();
    }

    /// Store a value reachable through a reference key.
    pub fn put_node(&self, key: &str, value: serde_json::Value) {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.insert(key.to_string(), value);
    }
}

impl GraphStore for MemoryStore {
    fn collection(&self, name: &str) -> BoxFuture<'_, Option<Vec<(String, EncryptedRecord)>>> {
        let snapshot = self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        Box::pin(async move { Ok(snapshot) })
    }

    fn resolve(&self, key: &str) -> BoxFuture<'_, Option<serde_json::Value>> {
        let value = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned();
        tracing::trace!(key = %key, found = value.is_some(), "MemoryStore: resolve");
        Box::pin(async move { Ok(value) })
    }
}
