// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The `Find` query builder.
//!
//! ```text
//! collection snapshot ──► decrypt ──► strip `_` ──► dereference ──► match
//!                                                                    │
//!        ┌─── unsorted: first `skip` entries never read, scan stops at limit
//!        └─── sorted:   collect all matches, stable sort, then skip/limit
//!                                                                    │
//!                                                              project ──► result
//! ```
//!
//! Decryption is fail-fast: the first record that cannot be decrypted aborts
//! the call and no partial result is returned. Without a sort, `skip` drops
//! raw snapshot entries before they are decrypted, so a skipped record is
//! never opened and never counted as a match.

use super::condition::Query;
use super::matcher::{Matcher, RangeSemantics};
use super::projection::Projection;
use super::sort::SortSpec;
use crate::config::QueryConfig;
use crate::deref::Dereferencer;
use crate::error::{DocMeshError, Result};
use crate::store::{Cipher, EncryptionKey, GraphStore};
use crate::value::Document;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Immutable query builder over one collection.
///
/// Every configuration call consumes the builder and returns a new one, so a
/// partially configured `Find` can be cloned and branched.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> docmesh::Result<()> {
/// use docmesh::query::{Find, Query, SortSpec};
/// use docmesh::store::{EncryptionKey, JsonCipher, MemoryStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let adults = Find::new(
///     store,
///     Arc::new(JsonCipher),
///     "users",
///     EncryptionKey::new("secret"),
///     Query::from_json(&serde_json::json!({"age": {"$gte": 18}}))?,
/// );
///
/// let page = adults.clone().sort(SortSpec::new().asc("name")).skip(10).limit(10).many().await?;
/// let first = adults.one().await?;
/// # Ok(())
/// # }
/// ```
pub struct Find<S: GraphStore, C: Cipher> {
    store: Arc<S>,
    cipher: Arc<C>,
    collection: String,
    key: EncryptionKey,
    query: Query,
    sort: SortSpec,
    skip: usize,
    limit: usize,
    fields: Projection,
    range: RangeSemantics,
    config: QueryConfig,
}

impl<S: GraphStore, C: Cipher> Clone for Find<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cipher: Arc::clone(&self.cipher),
            collection: self.collection.clone(),
            key: self.key.clone(),
            query: self.query.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            fields: self.fields.clone(),
            range: self.range,
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore, C: Cipher> Find<S, C> {
    pub fn new(
        store: Arc<S>,
        cipher: Arc<C>,
        collection: impl Into<String>,
        key: EncryptionKey,
        query: Query,
    ) -> Self {
        Self {
            store,
            cipher,
            collection: collection.into(),
            key,
            query,
            sort: SortSpec::new(),
            skip: 0,
            limit: 0,
            fields: Projection::new(),
            range: RangeSemantics::default(),
            config: QueryConfig::default(),
        }
    }

    /// Order results. An empty `SortSpec` keeps scan order.
    pub fn sort(self, sort: SortSpec) -> Self {
        Self { sort, ..self }
    }

    pub fn skip(self, skip: usize) -> Self {
        Self { skip, ..self }
    }

    /// Maximum number of results; 0 means unbounded.
    pub fn limit(self, limit: usize) -> Self {
        Self { limit, ..self }
    }

    pub fn fields(self, fields: Projection) -> Self {
        Self { fields, ..self }
    }

    pub fn range_semantics(self, range: RangeSemantics) -> Self {
        Self { range, ..self }
    }

    pub fn config(self, config: QueryConfig) -> Self {
        Self { config, ..self }
    }

    /// Run the query for at most one document.
    pub async fn one(self) -> Result<Option<Document>> {
        let docs = self.limit(1).execute().await?;
        Ok(docs.into_iter().next())
    }

    /// Run the query and return every selected document.
    pub async fn many(self) -> Result<Vec<Document>> {
        self.execute().await
    }

    #[instrument(skip(self), fields(collection = %self.collection, offset = self.skip, limit = self.limit))]
    async fn execute(&self) -> Result<Vec<Document>> {
        let start = Instant::now();
        match self.run().await {
            Ok(outcome) => {
                debug!(
                    scanned = outcome.scanned,
                    matched = outcome.matched,
                    returned = outcome.docs.len(),
                    "Query complete"
                );
                crate::metrics::record_query(
                    &self.collection,
                    outcome.scanned,
                    outcome.matched,
                    outcome.docs.len(),
                    start.elapsed(),
                );
                Ok(outcome.docs)
            }
            Err(e) => {
                warn!(error = %e, "Query failed");
                crate::metrics::record_query_error(&self.collection, e.kind());
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<QueryOutcome> {
        let entries = self.snapshot().await?;
        let deref = Dereferencer::new(Arc::clone(&self.store), &self.config);
        let matcher = Matcher::new(self.range);
        let sorted = !self.sort.is_empty();

        let mut docs = Vec::new();
        let mut scanned = 0;
        let mut matched = 0;

        let offset = if sorted { 0 } else { self.skip };
        for (id, record) in entries.into_iter().skip(offset) {
            if !sorted && self.limit > 0 && docs.len() >= self.limit {
                break;
            }
            scanned += 1;

            let mut doc = self
                .cipher
                .decrypt(&record, &self.key)
                .map_err(|e| DocMeshError::Decryption {
                    record_id: id.clone(),
                    message: e.to_string(),
                })?;
            doc.strip_metadata();
            let doc = deref.resolve_document(doc).await?;

            if !matcher.matches(&doc, &self.query) {
                continue;
            }
            matched += 1;
            docs.push(doc);
        }

        if sorted {
            docs.sort_by(|a, b| self.sort.compare(a, b));
            let take = if self.limit == 0 { usize::MAX } else { self.limit };
            docs = docs.into_iter().skip(self.skip).take(take).collect();
        }

        let docs = docs.into_iter().map(|doc| self.fields.apply(doc)).collect();
        Ok(QueryOutcome { docs, scanned, matched })
    }

    async fn snapshot(&self) -> Result<Vec<(String, crate::store::EncryptedRecord)>> {
        let timeout = self.config.resolve_timeout_duration();
        let read = tokio::time::timeout(timeout, self.store.collection(&self.collection))
            .await
            .map_err(|_| DocMeshError::Store(format!("collection read timed out after {:?}", timeout)))?;

        read.map_err(|e| DocMeshError::Store(e.to_string()))?
            .ok_or_else(|| DocMeshError::NotFound {
                collection: self.collection.clone(),
            })
    }
}

struct QueryOutcome {
    docs: Vec<Document>,
    scanned: usize,
    matched: usize,
}
