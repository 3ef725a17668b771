//! Peer registry.
//!
//! The locally known set of peer endpoints. It starts empty (or from the
//! persisted slot), grows through bootstrap merges, and can shrink by explicit
//! eviction. Backup and retrieve work on a shuffled snapshot.
//!
//! # Locking
//!
//! ```text
//! snapshot / shuffled ──► read guard  ──► clone ──► release
//! merge_and_persist   ──► write guard ──► union ──► save slot ──► release
//! ```
//!
//! The slot is written while the write guard is held, so the persisted list
//! always equals some in-memory state of the registry.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> docmesh::Result<()> {
//! use docmesh::config::RegistryConfig;
//! use docmesh::peer::PeerRegistry;
//! use docmesh::peer_store::PeerStore;
//!
//! let config = RegistryConfig::default();
//! let store = PeerStore::open(&config).await?;
//! let registry = PeerRegistry::open(store, &config.slot).await?;
//!
//! registry.merge_and_persist(vec!["http://peer-1:8765".into()]).await?;
//! let order = registry.shuffled().await;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::metrics;
use crate::peer_store::PeerStore;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Persistence binding of a registry.
struct Persistence {
    store: PeerStore,
    slot: String,
}

/// The set of known peer endpoints.
pub struct PeerRegistry {
    peers: RwLock<BTreeSet<String>>,
    persistence: Option<Persistence>,
}

impl PeerRegistry {
    /// Registry without persistence.
    pub fn in_memory() -> Self {
        Self {
            peers: RwLock::new(BTreeSet::new()),
            persistence: None,
        }
    }

    /// Registry seeded with peers, without persistence.
    pub fn with_peers<I, P>(peers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let peers: BTreeSet<String> = peers.into_iter().map(Into::into).collect();
        metrics::set_known_peers(peers.len());
        Self {
            peers: RwLock::new(peers),
            persistence: None,
        }
    }

    /// Registry backed by a slot in `store`, loaded now.
    pub async fn open(store: PeerStore, slot: impl Into<String>) -> Result<Self> {
        let slot = slot.into();
        let peers: BTreeSet<String> = store.load(&slot).await?.unwrap_or_default().into_iter().collect();

        if !peers.is_empty() {
            info!(slot = %slot, count = peers.len(), "Restored peer registry from previous run");
        }
        metrics::set_known_peers(peers.len());

        Ok(Self {
            peers: RwLock::new(peers),
            persistence: Some(Persistence { store, slot }),
        })
    }

    /// Current peers, in sorted order.
    pub async fn snapshot(&self) -> Vec<String> {
        self.peers.read().await.iter().cloned().collect()
    }

    /// Current peers in a fresh random order.
    pub async fn shuffled(&self) -> Vec<String> {
        let mut peers = self.snapshot().await;
        peers.shuffle(&mut rand::thread_rng());
        peers
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub async fn contains(&self, peer: &str) -> bool {
        self.peers.read().await.contains(peer)
    }

    /// Add one peer in memory. Returns `true` if it was new.
    pub async fn insert(&self, peer: impl Into<String>) -> bool {
        let mut peers = self.peers.write().await;
        let added = peers.insert(peer.into());
        metrics::set_known_peers(peers.len());
        added
    }

    /// Evict a peer and persist the result. Returns `true` if it was known.
    pub async fn remove(&self, peer: &str) -> Result<bool> {
        let mut peers = self.peers.write().await;
        if !peers.remove(peer) {
            return Ok(false);
        }
        self.persist(&peers).await?;
        metrics::set_known_peers(peers.len());
        debug!(peer = %peer, remaining = peers.len(), "Evicted peer");
        Ok(true)
    }

    /// Union `discovered` into the registry and persist the merged set.
    ///
    /// Returns the number of peers that were not known before. The slot is
    /// written even when nothing new was added.
    pub async fn merge_and_persist<I>(&self, discovered: I) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let mut peers = self.peers.write().await;
        let before = peers.len();
        peers.extend(discovered.into_iter().filter(|p| !p.trim().is_empty()));
        let added = peers.len() - before;

        self.persist(&peers).await?;
        metrics::set_known_peers(peers.len());
        debug!(added, total = peers.len(), "Merged peers into registry");
        Ok(added)
    }

    /// Write the registry to its slot under the caller's guard.
    async fn persist(&self, peers: &BTreeSet<String>) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let list: Vec<String> = peers.iter().cloned().collect();
        if let Err(e) = persistence.store.save(&persistence.slot, &list).await {
            warn!(slot = %persistence.slot, error = %e, "Failed to persist peer registry");
            return Err(e);
        }
        Ok(())
    }

    /// Checkpoint and close the backing store, if any.
    pub async fn close(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.store.close().await;
        }
    }
}
