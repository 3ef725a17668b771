//! Mock PeerTransport for testing.
//!
//! Peers are simulated in memory: a put stores the value on that peer and a
//! later get from the same peer returns it. Every call is recorded for
//! assertions, and peers can be made to fail or to answer slowly.

use docmesh::transport::{PeerTransport, PutPayload, TransportFuture};
use docmesh::DocMeshError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// A recorded put() call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCall {
    pub peer: String,
    pub key: String,
    pub value: String,
}

/// A recorded get() call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCall {
    pub peer: String,
    pub key: String,
}

/// Mock implementation of PeerTransport that records all calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockTransport::new();
/// mock.fail_peer("http://p1").await;
/// mock.advertise("http://boot", &["http://p1", "http://p2"]).await;
///
/// // Use in tests...
///
/// assert_eq!(mock.puts().await.len(), 2);
/// ```
#[derive(Default)]
pub struct MockTransport {
    /// Recorded put() calls
    puts: RwLock<Vec<PutCall>>,
    /// Recorded get() calls
    gets: RwLock<Vec<GetCall>>,
    /// Recorded list_peers() calls
    lists: RwLock<Vec<String>>,
    /// Values held by each simulated peer: peer -> key -> JSON text
    stored: RwLock<HashMap<String, HashMap<String, String>>>,
    /// Peer lists served by bootstrap nodes
    advertised: RwLock<HashMap<String, Vec<String>>>,
    /// Peers (or bootstrap nodes) that always fail
    failing: RwLock<HashSet<String>>,
    /// Peers that answer only after a delay
    slow: RwLock<HashMap<String, Duration>>,
    /// Fail this many puts, whichever peers they go to
    fail_first_puts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `peer` fail with a network error.
    pub async fn fail_peer(&self, peer: &str) {
        self.failing.write().await.insert(peer.to_string());
    }

    /// Make every call to `peer` take `delay` before answering.
    pub async fn slow_peer(&self, peer: &str, delay: Duration) {
        self.slow.write().await.insert(peer.to_string(), delay);
    }

    /// Fail the next `n` puts.
    pub fn fail_first_puts(&self, n: usize) {
        self.fail_first_puts.store(n, Ordering::SeqCst);
    }

    /// Serve `peers` from bootstrap node `url`.
    pub async fn advertise(&self, url: &str, peers: &[&str]) {
        self.advertised
            .write()
            .await
            .insert(url.to_string(), peers.iter().map(|p| p.to_string()).collect());
    }

    /// Pre-store a value on a peer.
    pub async fn seed(&self, peer: &str, key: &str, value: &str) {
        self.stored
            .write()
            .await
            .entry(peer.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Peers holding a value for `key`.
    pub async fn holders(&self, key: &str) -> Vec<String> {
        let mut holders: Vec<String> = self
            .stored
            .read()
            .await
            .iter()
            .filter(|(_, values)| values.contains_key(key))
            .map(|(peer, _)| peer.clone())
            .collect();
        holders.sort();
        holders
    }

    pub async fn puts(&self) -> Vec<PutCall> {
        self.puts.read().await.clone()
    }

    pub async fn gets(&self) -> Vec<GetCall> {
        self.gets.read().await.clone()
    }

    pub async fn list_calls(&self) -> Vec<String> {
        self.lists.read().await.clone()
    }

    async fn simulate(&self, peer: &str) -> docmesh::Result<()> {
        let delay = self.slow.read().await.get(peer).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().await.contains(peer) {
            return Err(DocMeshError::network(peer, "503 Service Unavailable"));
        }
        Ok(())
    }
}

impl PeerTransport for MockTransport {
    fn list_peers<'a>(&'a self, bootstrap_url: &'a str) -> TransportFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.lists.write().await.push(bootstrap_url.to_string());
            self.simulate(bootstrap_url).await?;
            self.advertised
                .read()
                .await
                .get(bootstrap_url)
                .cloned()
                .ok_or_else(|| DocMeshError::network(bootstrap_url, "connection refused"))
        })
    }

    fn put<'a>(&'a self, peer: &'a str, payload: &'a PutPayload) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.puts.write().await.push(PutCall {
                peer: peer.to_string(),
                key: payload.key.clone(),
                value: payload.value.clone(),
            });

            let forced = self
                .fail_first_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if forced {
                return Err(DocMeshError::network(peer, "connection reset"));
            }
            self.simulate(peer).await?;

            self.seed(peer, &payload.key, &payload.value).await;
            Ok(())
        })
    }

    fn get<'a>(&'a self, peer: &'a str, key: &'a str) -> TransportFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.gets.write().await.push(GetCall {
                peer: peer.to_string(),
                key: key.to_string(),
            });
            self.simulate(peer).await?;

            self.stored
                .read()
                .await
                .get(peer)
                .and_then(|values| values.get(key))
                .map(|text| serde_json::Value::String(text.clone()))
                .ok_or_else(|| DocMeshError::network(peer, "404 Not Found"))
        })
    }
}
