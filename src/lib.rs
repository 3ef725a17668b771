//! # docmesh
//!
//! Query encrypted documents held in a graph store, and back them up to a mesh
//! of peers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                                 docmesh                                   │
//! │                                                                           │
//! │  ┌────────────┐   ┌─────────┐   ┌──────────────┐   ┌───────────────────┐  │
//! │  │ GraphStore │──►│ Cipher  │──►│ Dereferencer │──►│ match/sort/page/  │  │
//! │  │ (snapshot) │   │(decrypt)│   │ (references) │   │ project  (Find)   │  │
//! │  └────────────┘   └─────────┘   └──────────────┘   └───────────────────┘  │
//! │                                                                           │
//! │  ┌──────────────────┐    ┌──────────────┐    ┌──────────────────────────┐ │
//! │  │ReplicationClient │───►│PeerTransport │───►│ peers: /api/put /api/get │ │
//! │  │ backup/retrieve/ │    │ (HTTP)       │    │        /api/peers        │ │
//! │  │ bootstrap        │    └──────────────┘    └──────────────────────────┘ │
//! │  └──────────────────┘                                                     │
//! │           │                                                               │
//! │           ▼                                                               │
//! │  ┌──────────────┐    ┌─────────────────┐                                  │
//! │  │ PeerRegistry │───►│ PeerStore       │                                  │
//! │  │ (RwLock set) │    │ (SQLite slot)   │                                  │
//! │  └──────────────┘    └─────────────────┘                                  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Query Engine
//!
//! [`Find`] snapshots a collection, decrypts every record, resolves
//! references, then filters with a [`Query`], sorts, paginates and projects.
//!
//! ## Replication
//!
//! [`ReplicationClient`] writes to a quorum of randomly chosen peers, reads
//! back with sequential failover, and grows the [`PeerRegistry`] from
//! bootstrap nodes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docmesh::{DocMeshConfig, EncryptionKey, Find, JsonCipher, MemoryStore, PeerRegistry, Query, ReplicationClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> docmesh::Result<()> {
//!     let config = DocMeshConfig::default();
//!
//!     let store = Arc::new(MemoryStore::new());
//!     let query = Query::from_json(&serde_json::json!({"age": {"$gte": 18}}))?;
//!     let adults = Find::new(store, Arc::new(JsonCipher), "people", EncryptionKey::new("key"), query)
//!         .many()
//!         .await?;
//!
//!     let registry = Arc::new(PeerRegistry::in_memory());
//!     let client = ReplicationClient::http(registry, config.replication.clone())?;
//!     client.bootstrap().await?;
//!     if let Some(first) = adults.first() {
//!         client.backup("adult-0", first).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deref;
pub mod error;
pub mod metrics;
pub mod peer;
pub mod peer_store;
pub mod query;
pub mod replication;
pub mod resilience;
pub mod store;
pub mod transport;
pub mod value;

// Re-exports for convenience
pub use config::{DocMeshConfig, QueryConfig, RegistryConfig, ReplicationSettings};
pub use deref::Dereferencer;
pub use error::{DocMeshError, Result};
pub use peer::PeerRegistry;
pub use peer_store::PeerStore;
pub use query::{Condition, Find, Projection, Query, Range, RangeSemantics, SortSpec};
pub use replication::{BackupReport, BootstrapReport, ReplicationClient};
pub use store::{Cipher, EncryptedRecord, EncryptionKey, GraphStore, JsonCipher, MemoryStore};
pub use transport::{HttpTransport, PeerTransport};
pub use value::{Document, Value};
