//! Configuration for docmesh.
//!
//! Configuration can be constructed programmatically or deserialized from
//! YAML/JSON. Every section and field has a default, so an empty document is a
//! valid configuration.
//!
//! # Quick Start
//!
//! ```rust
//! use docmesh::config::DocMeshConfig;
//!
//! let mut config = DocMeshConfig::default();
//! config.replication.bootstrap = vec!["https://seed.example.com".into()];
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! DocMeshConfig
//! ├── replication: ReplicationSettings
//! │   ├── backup_peers: usize          # Quorum size for backup (2)
//! │   ├── max_retrieve_attempts: usize # Failover bound for retrieve (10)
//! │   ├── request_timeout: String      # Per peer call ("5s")
//! │   ├── bootstrap_concurrency: usize # Parallel bootstrap fetches (16)
//! │   └── bootstrap: Vec<String>       # Bootstrap node URLs
//! ├── query: QueryConfig
//! │   ├── resolve_timeout: String      # Per reference lookup ("5s")
//! │   └── max_reference_depth: usize   # Nested reference bound (8)
//! └── registry: RegistryConfig         # SQLite peer-set persistence
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! replication:
//!   backup_peers: 3
//!   request_timeout: "2s"
//!   bootstrap:
//!     - "https://seed-1.example.com"
//!     - "https://seed-2.example.com"
//!
//! query:
//!   resolve_timeout: "500ms"
//!
//! registry:
//!   sqlite_path: "/var/lib/app/peers.db"
//! ```

use crate::error::{DocMeshError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeshConfig {
    /// Backup, retrieve and bootstrap settings.
    #[serde(default)]
    pub replication: ReplicationSettings,

    /// Query engine settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Peer registry persistence settings.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl DocMeshConfig {
    /// Create a config for testing: in-memory registry, short timeouts.
    pub fn for_testing() -> Self {
        Self {
            replication: ReplicationSettings {
                request_timeout: "200ms".to_string(),
                ..Default::default()
            },
            query: QueryConfig {
                resolve_timeout: "200ms".to_string(),
                ..Default::default()
            },
            registry: RegistryConfig::in_memory(),
        }
    }

    /// Reject settings that would make every operation fail.
    pub fn validate(&self) -> Result<()> {
        if self.replication.backup_peers == 0 {
            return Err(DocMeshError::Config(
                "replication.backup_peers must be at least 1".to_string(),
            ));
        }
        if self.replication.max_retrieve_attempts == 0 {
            return Err(DocMeshError::Config(
                "replication.max_retrieve_attempts must be at least 1".to_string(),
            ));
        }
        if self.replication.bootstrap_concurrency == 0 {
            return Err(DocMeshError::Config(
                "replication.bootstrap_concurrency must be at least 1".to_string(),
            ));
        }
        if self.registry.slot.trim().is_empty() {
            return Err(DocMeshError::Config("registry.slot must not be empty".to_string()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings: backup / retrieve / bootstrap
// ═══════════════════════════════════════════════════════════════════════════════

/// Replication client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Number of peers that must acknowledge a backup.
    #[serde(default = "default_backup_peers")]
    pub backup_peers: usize,

    /// Upper bound on sequential retrieve attempts.
    #[serde(default = "default_max_retrieve_attempts")]
    pub max_retrieve_attempts: usize,

    /// Timeout for a single peer call as a duration string (e.g., "5s").
    #[serde(default = "default_timeout")]
    pub request_timeout: String,

    /// Maximum bootstrap nodes contacted at once.
    #[serde(default = "default_bootstrap_concurrency")]
    pub bootstrap_concurrency: usize,

    /// Bootstrap node base URLs.
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

fn default_backup_peers() -> usize {
    2
}

fn default_max_retrieve_attempts() -> usize {
    10
}

fn default_timeout() -> String {
    "5s".to_string()
}

fn default_bootstrap_concurrency() -> usize {
    16
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            backup_peers: 2,
            max_retrieve_attempts: 10,
            request_timeout: "5s".to_string(),
            bootstrap_concurrency: 16,
            bootstrap: Vec::new(),
        }
    }
}

impl ReplicationSettings {
    /// Parse the request_timeout string to a Duration.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QueryConfig: dereferencing bounds
// ═══════════════════════════════════════════════════════════════════════════════

/// Query engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Timeout for each reference lookup against the graph store.
    #[serde(default = "default_timeout")]
    pub resolve_timeout: String,

    /// How many references may be chained before resolution gives up.
    #[serde(default = "default_max_reference_depth")]
    pub max_reference_depth: usize,
}

fn default_max_reference_depth() -> usize {
    8
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: "5s".to_string(),
            max_reference_depth: 8,
        }
    }
}

impl QueryConfig {
    /// Parse the resolve_timeout string to a Duration.
    pub fn resolve_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.resolve_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RegistryConfig: peer-set persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Peer registry persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the SQLite database holding the registry slot.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Name of the slot the peer list is stored under.
    #[serde(default = "default_slot")]
    pub slot: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "docmesh_peers.db".to_string()
}

fn default_slot() -> String {
    "peers".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "docmesh_peers.db".to_string(),
            slot: "peers".to_string(),
            wal_mode: true,
        }
    }
}

impl RegistryConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            slot: "peers".to_string(),
            wal_mode: false,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path == ":memory:"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
