// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for docmesh.
//!
//! Errors are categorized by the subsystem that raised them (query engine,
//! replication client, peer store) and carry enough context to log usefully.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `NotFound` | No | Collection absent from the backing store |
//! | `Decryption` | No | Key mismatch or corrupt blob (aborts the whole query) |
//! | `QueryEvaluation` | No | Malformed query, condition or sort spec |
//! | `Dereference` | No | Reference could not be resolved |
//! | `Store` | Yes | Backing store read failed |
//! | `Network` | Yes | Peer call failed or timed out |
//! | `EmptyPeerSet` | No | No peers known for backup/retrieve |
//! | `QuorumNotReached` | Yes | Backup acknowledged by fewer peers than requested |
//! | `RetrieveExhausted` | Yes | Every retrieve attempt failed |
//! | `InvalidDocument` | No | Payload is not a document |
//! | `PeerStore` | No | Local SQLite errors (needs operator attention) |
//! | `Serialization` | No | JSON encode/decode failure |
//! | `Config` | No | Configuration invalid |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`DocMeshError::is_retryable()`] to decide whether a failed call is
//! worth repeating later. The replication client already retries and fails
//! over internally; a retryable error means the whole operation may succeed
//! once peers recover.

use crate::replication::BackupReport;
use thiserror::Error;

/// Result type alias for docmesh operations.
pub type Result<T> = std::result::Result<T, DocMeshError>;

/// Errors that can occur while querying or replicating documents.
#[derive(Error, Debug)]
pub enum DocMeshError {
    /// The requested collection does not exist in the backing store.
    #[error("Collection not found: {collection}")]
    NotFound { collection: String },

    /// A record could not be decrypted with the supplied key.
    ///
    /// Fail-fast: one undecryptable record aborts the whole query.
    #[error("Decryption failed for record {record_id}: {message}")]
    Decryption { record_id: String, message: String },

    /// The query, a condition inside it, or a sort spec is malformed.
    #[error("Query evaluation error: {0}")]
    QueryEvaluation(String),

    /// A reference could not be resolved (timeout, store failure, nesting too deep).
    #[error("Dereference error ({key}): {message}")]
    Dereference { key: String, message: String },

    /// The backing store failed to produce a collection snapshot.
    #[error("Store error: {0}")]
    Store(String),

    /// A peer call failed.
    ///
    /// Covers connection errors, non-2xx responses and timeouts alike.
    #[error("Network error ({peer}): {message}")]
    Network { peer: String, message: String },

    /// No peers are known, so the operation cannot even start.
    #[error("No peers available for {operation}")]
    EmptyPeerSet { operation: String },

    /// Fewer peers acknowledged a backup than the requested quorum.
    ///
    /// The partial report is attached so callers can see who did acknowledge.
    #[error("Backup quorum not reached: {} of {} peers acknowledged", .report.acknowledged.len(), .report.required)]
    QuorumNotReached { report: BackupReport },

    /// Every retrieve attempt failed.
    #[error("Retrieve exhausted for {key} after {attempts} attempts: {last_error}")]
    RetrieveExhausted {
        key: String,
        attempts: usize,
        last_error: String,
    },

    /// A payload decoded from a peer or the store is not a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// SQLite error in the persisted peer registry.
    #[error("Peer store error: {0}")]
    PeerStore(#[from] sqlx::Error),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocMeshError {
    /// Create a network error for a peer.
    pub fn network(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Create a query evaluation error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryEvaluation(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Store(_) => true,
            Self::QuorumNotReached { .. } => true,
            Self::RetrieveExhausted { .. } => true,
            Self::NotFound { .. } => false,
            Self::Decryption { .. } => false, // Wrong key stays wrong
            Self::QueryEvaluation(_) => false,
            Self::Dereference { .. } => false,
            Self::EmptyPeerSet { .. } => false, // Needs a bootstrap first
            Self::InvalidDocument(_) => false,
            Self::PeerStore(_) => false,
            Self::Serialization(_) => false,
            Self::Config(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Short stable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Decryption { .. } => "decryption",
            Self::QueryEvaluation(_) => "query_evaluation",
            Self::Dereference { .. } => "dereference",
            Self::Store(_) => "store",
            Self::Network { .. } => "network",
            Self::EmptyPeerSet { .. } => "empty_peer_set",
            Self::QuorumNotReached { .. } => "quorum_not_reached",
            Self::RetrieveExhausted { .. } => "retrieve_exhausted",
            Self::InvalidDocument(_) => "invalid_document",
            Self::PeerStore(_) => "peer_store",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}
