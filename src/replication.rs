// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication client: quorum backup, failover retrieve, bootstrap merge.
//!
//! All three operations work on a fresh shuffled snapshot of the
//! [`PeerRegistry`], so load spreads evenly across known peers.
//!
//! # Backup
//!
//! ```text
//! shuffled: [p3, p0, p4, p1, p2]      amount = 2
//!            ──┬───  ─┬─
//!     initial sends   cursor ──► next unseen peer on each failure
//!
//! p3 ✓   p0 ✗ ──► p4 ✓      acknowledged = {p3, p4}  quorum reached
//! ```
//!
//! The initial sends run concurrently on a [`JoinSet`]. Every failure extends
//! the same cursor by exactly one peer, so no peer is ever tried twice and the
//! total number of attempts is bounded by the registry size.
//!
//! # Retrieve
//!
//! Strictly sequential: the next peer is only asked once the previous one has
//! failed, up to `max_retrieve_attempts`.
//!
//! # Bootstrap
//!
//! Every bootstrap node is asked for its peer list concurrently. Only after
//! all of them have settled is the union merged into the registry and
//! persisted, so one dead node never blocks the others.

use crate::config::ReplicationSettings;
use crate::error::{DocMeshError, Result};
use crate::metrics;
use crate::peer::PeerRegistry;
use crate::resilience::{with_deadline, FanOut};
use crate::transport::{HttpTransport, PeerTransport, PutPayload};
use crate::value::Document;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Outcome of a backup round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Key the document was stored under.
    pub key: String,
    /// Acknowledgements needed (`min(peer_count, known peers)`).
    pub required: usize,
    /// Peers that acknowledged, in completion order.
    pub acknowledged: Vec<String>,
    /// Peers that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl BackupReport {
    /// Total peers contacted.
    pub fn attempts(&self) -> usize {
        self.acknowledged.len() + self.failed.len()
    }

    pub fn quorum_reached(&self) -> bool {
        self.acknowledged.len() >= self.required
    }
}

/// Outcome of a bootstrap round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Bootstrap nodes asked.
    pub contacted: usize,
    /// Nodes that failed to answer, with the error message.
    pub failed: Vec<(String, String)>,
    /// Peers that were not known before this round.
    pub added: usize,
    /// Registry size after the merge.
    pub total: usize,
}

/// Client for backing documents up to peers and reading them back.
pub struct ReplicationClient<T: PeerTransport> {
    registry: Arc<PeerRegistry>,
    transport: Arc<T>,
    settings: ReplicationSettings,
}

impl<T: PeerTransport> Clone for ReplicationClient<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
            settings: self.settings.clone(),
        }
    }
}

impl ReplicationClient<HttpTransport> {
    /// Client speaking HTTP, with the request timeout from `settings`.
    pub fn http(registry: Arc<PeerRegistry>, settings: ReplicationSettings) -> Result<Self> {
        let transport = HttpTransport::new(settings.request_timeout_duration())?;
        Ok(Self::new(registry, Arc::new(transport), settings))
    }
}

impl<T: PeerTransport> ReplicationClient<T> {
    pub fn new(registry: Arc<PeerRegistry>, transport: Arc<T>, settings: ReplicationSettings) -> Self {
        Self {
            registry,
            transport,
            settings,
        }
    }

    /// The registry this client draws peers from.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ReplicationSettings {
        &self.settings
    }

    fn timeout(&self) -> Duration {
        self.settings.request_timeout_duration()
    }

    /// Back `document` up to the configured number of peers.
    pub async fn backup(&self, key: &str, document: &Document) -> Result<BackupReport> {
        self.backup_with(key, document, self.settings.backup_peers).await
    }

    /// Back `document` up to `peer_count` peers.
    ///
    /// Succeeds once `min(peer_count, known peers)` peers acknowledged. On
    /// failure the partial report travels inside
    /// [`DocMeshError::QuorumNotReached`].
    #[instrument(skip(self, document), fields(key = %key))]
    pub async fn backup_with(&self, key: &str, document: &Document, peer_count: usize) -> Result<BackupReport> {
        let peers = self.registry.shuffled().await;
        if peers.is_empty() {
            return Err(DocMeshError::EmptyPeerSet {
                operation: "backup".to_string(),
            });
        }

        let amount = peer_count.min(peers.len());
        let payload = Arc::new(PutPayload {
            key: key.to_string(),
            value: serde_json::to_string(&document.to_json())?,
        });
        let timeout = self.timeout();

        let mut report = BackupReport {
            key: key.to_string(),
            required: amount,
            acknowledged: Vec::with_capacity(amount),
            failed: Vec::new(),
        };

        let mut join_set: JoinSet<(String, Result<()>)> = JoinSet::new();
        for peer in &peers[..amount] {
            self.spawn_put(&mut join_set, peer.clone(), Arc::clone(&payload), timeout);
        }
        let mut cursor = amount;

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((peer, Ok(()))) => {
                    debug!(peer = %peer, "Backup acknowledged");
                    metrics::record_backup_send(&peer, true);
                    report.acknowledged.push(peer);
                    continue;
                }
                Ok((peer, Err(e))) => {
                    warn!(peer = %peer, error = %e, "Backup send failed");
                    metrics::record_backup_send(&peer, false);
                    report.failed.push((peer, e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "Backup send task failed (JoinError)");
                }
            }

            if cursor < peers.len() {
                debug!(peer = %peers[cursor], cursor, "Retrying backup on next peer");
                self.spawn_put(&mut join_set, peers[cursor].clone(), Arc::clone(&payload), timeout);
                cursor += 1;
            }
        }

        let reached = report.quorum_reached();
        metrics::record_backup_outcome(reached, report.acknowledged.len(), report.attempts());

        if !reached {
            warn!(
                acknowledged = report.acknowledged.len(),
                required = amount,
                attempts = report.attempts(),
                "Backup quorum not reached"
            );
            return Err(DocMeshError::QuorumNotReached { report });
        }

        info!(
            acknowledged = report.acknowledged.len(),
            attempts = report.attempts(),
            "Backup complete"
        );
        Ok(report)
    }

    fn spawn_put(
        &self,
        join_set: &mut JoinSet<(String, Result<()>)>,
        peer: String,
        payload: Arc<PutPayload>,
        timeout: Duration,
    ) {
        let transport = Arc::clone(&self.transport);
        join_set.spawn(async move {
            let result = with_deadline(&peer, "put", timeout, transport.put(&peer, &payload)).await;
            (peer, result)
        });
    }

    /// Read the document stored under `key`, failing over across peers.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn retrieve(&self, key: &str) -> Result<Document> {
        let peers = self.registry.shuffled().await;
        if peers.is_empty() {
            return Err(DocMeshError::EmptyPeerSet {
                operation: "retrieve".to_string(),
            });
        }

        let budget = peers.len().min(self.settings.max_retrieve_attempts);
        let timeout = self.timeout();
        let mut last_error = String::from("no attempts made");

        for (index, peer) in peers.iter().take(budget).enumerate() {
            let attempt = index + 1;
            let outcome = match with_deadline(peer, "get", timeout, self.transport.get(peer, key)).await {
                Ok(body) => decode_document(body),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(document) => {
                    metrics::record_retrieve_attempt(peer, true);
                    metrics::record_retrieve_outcome(true, attempt);
                    debug!(peer = %peer, attempt, "Retrieved document");
                    return Ok(document);
                }
                Err(e) => {
                    warn!(peer = %peer, attempt, budget, error = %e, "Retrieve attempt failed");
                    metrics::record_retrieve_attempt(peer, false);
                    last_error = e.to_string();
                }
            }
        }

        metrics::record_retrieve_outcome(false, budget);
        Err(DocMeshError::RetrieveExhausted {
            key: key.to_string(),
            attempts: budget,
            last_error,
        })
    }

    /// Callback form of [`retrieve`](Self::retrieve).
    ///
    /// `on_result` runs exactly once, with the document or the final error.
    pub async fn retrieve_with<F>(&self, key: &str, on_result: F)
    where
        F: FnOnce(Result<Document>),
    {
        on_result(self.retrieve(key).await);
    }

    /// Bootstrap from the configured nodes.
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        let urls = self.settings.bootstrap.clone();
        self.bootstrap_from(&urls).await
    }

    /// Ask every node in `urls` for its peers and merge them all.
    ///
    /// Node failures are reported, not returned. Only a failure to persist
    /// the merged registry makes this call fail.
    #[instrument(skip(self, urls), fields(nodes = urls.len()))]
    pub async fn bootstrap_from(&self, urls: &[String]) -> Result<BootstrapReport> {
        let start = Instant::now();
        let timeout = self.timeout();
        let fan_out = FanOut::new(self.settings.bootstrap_concurrency);

        let fetches: Vec<_> = urls
            .iter()
            .map(|url| {
                let fan_out = &fan_out;
                async move {
                    let result = fan_out
                        .run(with_deadline(url, "list_peers", timeout, self.transport.list_peers(url)))
                        .await
                        .and_then(|fetched| fetched);
                    (url.clone(), result)
                }
            })
            .collect();

        let results = futures::future::join_all(fetches).await;

        let mut report = BootstrapReport {
            contacted: urls.len(),
            ..Default::default()
        };
        let mut discovered = Vec::new();
        for (url, result) in results {
            match result {
                Ok(peers) => {
                    debug!(bootstrap = %url, count = peers.len(), "Bootstrap node answered");
                    discovered.extend(peers);
                }
                Err(e) => {
                    warn!(bootstrap = %url, error = %e, "Bootstrap node failed");
                    report.failed.push((url, e.to_string()));
                }
            }
        }

        report.added = self.registry.merge_and_persist(discovered).await?;
        report.total = self.registry.len().await;

        metrics::record_bootstrap(report.contacted, report.failed.len(), report.added, start.elapsed());
        info!(
            contacted = report.contacted,
            failed = report.failed.len(),
            added = report.added,
            total = report.total,
            "Bootstrap complete"
        );
        Ok(report)
    }
}

/// Decode a peer's read response.
///
/// Peers return either the document object or the JSON text that was written.
/// Decode a peer body with the same wire rules as stored records, so a
/// backed-up reference comes back as a reference.
fn decode_document(body: serde_json::Value) -> Result<Document> {
    match body {
        serde_json::Value::String(text) => {
            let parsed: serde_json::Value = serde_json::from_str(&text)?;
            Document::from_wire(parsed)
        }
        other => Document::from_wire(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportFuture;
    use crate::value::Value;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        puts: Mutex<Vec<String>>,
        gets: Mutex<Vec<String>>,
        fail_first_puts: AtomicUsize,
        failing: HashSet<String>,
        body: Option<serde_json::Value>,
        lists: HashMap<String, Vec<String>>,
    }

    impl Recorder {
        fn puts(&self) -> Vec<String> {
            self.puts.lock().unwrap().clone()
        }

        fn gets(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }
    }

    impl PeerTransport for Recorder {
        fn list_peers<'a>(&'a self, bootstrap_url: &'a str) -> TransportFuture<'a, Vec<String>> {
            Box::pin(async move {
                self.lists
                    .get(bootstrap_url)
                    .cloned()
                    .ok_or_else(|| DocMeshError::network(bootstrap_url, "connection refused"))
            })
        }

        fn put<'a>(&'a self, peer: &'a str, _payload: &'a PutPayload) -> TransportFuture<'a, ()> {
            Box::pin(async move {
                self.puts.lock().unwrap().push(peer.to_string());
                let forced = self
                    .fail_first_puts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if forced || self.failing.contains(peer) {
                    return Err(DocMeshError::network(peer, "503"));
                }
                Ok(())
            })
        }

        fn get<'a>(&'a self, peer: &'a str, _key: &'a str) -> TransportFuture<'a, serde_json::Value> {
            Box::pin(async move {
                self.gets.lock().unwrap().push(peer.to_string());
                if self.failing.contains(peer) {
                    return Err(DocMeshError::network(peer, "503"));
                }
                self.body.clone().ok_or_else(|| DocMeshError::network(peer, "404"))
            })
        }
    }

    fn peers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://p{}", i)).collect()
    }

    fn client(peer_list: Vec<String>, transport: Recorder) -> (ReplicationClient<Recorder>, Arc<Recorder>) {
        let transport = Arc::new(transport);
        let registry = Arc::new(PeerRegistry::with_peers(peer_list));
        let settings = ReplicationSettings {
            request_timeout: "200ms".to_string(),
            ..Default::default()
        };
        (
            ReplicationClient::new(registry, Arc::clone(&transport), settings),
            transport,
        )
    }

    fn distinct(list: &[String]) -> bool {
        list.iter().collect::<HashSet<_>>().len() == list.len()
    }

    #[tokio::test]
    async fn test_empty_registry_is_empty_peer_set() {
        let (client, transport) = client(Vec::new(), Recorder::default());
        let doc = Document::new().with("a", 1);

        let err = client.backup("k", &doc).await.unwrap_err();
        assert!(matches!(err, DocMeshError::EmptyPeerSet { ref operation } if operation == "backup"));

        let err = client.retrieve("k").await.unwrap_err();
        assert!(matches!(err, DocMeshError::EmptyPeerSet { ref operation } if operation == "retrieve"));
        assert!(transport.puts().is_empty());
        assert!(transport.gets().is_empty());
    }

    #[tokio::test]
    async fn test_backup_sends_exactly_quorum() {
        let (client, transport) = client(peers(5), Recorder::default());
        let report = client.backup("k", &Document::new().with("a", 1)).await.unwrap();

        assert_eq!(transport.puts().len(), 2);
        assert_eq!(report.acknowledged.len(), 2);
        assert_eq!(report.attempts(), 2);
        assert!(report.quorum_reached());
    }

    #[tokio::test]
    async fn test_one_failure_triggers_exactly_one_retry() {
        let recorder = Recorder {
            fail_first_puts: AtomicUsize::new(1),
            ..Default::default()
        };
        let (client, transport) = client(peers(5), recorder);
        let report = client.backup("k", &Document::new().with("a", 1)).await.unwrap();

        let puts = transport.puts();
        assert_eq!(puts.len(), 3);
        assert!(distinct(&puts));
        assert_eq!(report.acknowledged.len(), 2);
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_reports_partial_quorum() {
        let recorder = Recorder {
            failing: peers(3).into_iter().collect(),
            ..Default::default()
        };
        let (client, transport) = client(peers(3), recorder);

        match client.backup("k", &Document::new()).await {
            Err(DocMeshError::QuorumNotReached { report }) => {
                assert_eq!(report.required, 2);
                assert!(report.acknowledged.is_empty());
                assert_eq!(report.failed.len(), 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let puts = transport.puts();
        assert_eq!(puts.len(), 3);
        assert!(distinct(&puts));
    }

    #[tokio::test]
    async fn test_quorum_is_capped_by_known_peers() {
        let (client, transport) = client(peers(1), Recorder::default());
        let report = client.backup_with("k", &Document::new(), 4).await.unwrap();
        assert_eq!(report.required, 1);
        assert_eq!(transport.puts(), vec!["http://p0"]);
    }

    #[tokio::test]
    async fn test_retrieve_fails_over_to_healthy_peer() {
        let list = peers(4);
        let recorder = Recorder {
            failing: list[..3].iter().cloned().collect(),
            body: Some(json!(r#"{"name":"alice","n":2}"#)),
            ..Default::default()
        };
        let (client, transport) = client(list, recorder);

        let doc = client.retrieve("k").await.unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("alice")));

        let gets = transport.gets();
        assert!(distinct(&gets));
        assert_eq!(gets.last().map(String::as_str), Some("http://p3"));
    }

    #[tokio::test]
    async fn test_retrieve_accepts_object_body() {
        let recorder = Recorder {
            body: Some(json!({"a": [1, 2]})),
            ..Default::default()
        };
        let (client, transport) = client(peers(3), recorder);
        let doc = client.retrieve("k").await.unwrap();
        assert_eq!(doc.get("a"), Some(&Value::from(vec![1, 2])));
        assert_eq!(transport.gets().len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_stops_at_attempt_budget() {
        let list = peers(15);
        let recorder = Recorder {
            failing: list.iter().cloned().collect(),
            ..Default::default()
        };
        let (client, transport) = client(list, recorder);

        match client.retrieve("k").await {
            Err(DocMeshError::RetrieveExhausted { attempts, last_error, .. }) => {
                assert_eq!(attempts, 10);
                assert!(last_error.contains("503"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(transport.gets().len(), 10);
    }

    #[tokio::test]
    async fn test_undecodable_body_counts_as_failure() {
        let recorder = Recorder {
            body: Some(json!("not a document")),
            ..Default::default()
        };
        let (client, transport) = client(peers(2), recorder);
        let err = client.retrieve("k").await.unwrap_err();
        assert!(matches!(err, DocMeshError::RetrieveExhausted { attempts: 2, .. }));
        assert_eq!(transport.gets().len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_with_calls_back_once() {
        let (client, _) = client(Vec::new(), Recorder::default());
        let mut calls = 0;
        client
            .retrieve_with("k", |result| {
                calls += 1;
                assert!(result.is_err());
            })
            .await;
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_merges_union_despite_failed_node() {
        let recorder = Recorder {
            lists: HashMap::from([
                ("http://b1".to_string(), vec!["http://p1".to_string(), "http://p2".to_string()]),
                ("http://b2".to_string(), vec!["http://p2".to_string(), "http://p3".to_string()]),
            ]),
            ..Default::default()
        };
        let (client, _) = client(Vec::new(), recorder);

        let urls = vec![
            "http://b1".to_string(),
            "http://dead".to_string(),
            "http://b2".to_string(),
        ];
        let report = client.bootstrap_from(&urls).await.unwrap();

        assert_eq!(report.contacted, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "http://dead");
        assert_eq!(report.added, 3);
        assert_eq!(report.total, 3);
        assert_eq!(
            client.registry().snapshot().await,
            vec!["http://p1", "http://p2", "http://p3"]
        );
    }

    #[test]
    fn test_decode_document_shapes() {
        assert!(decode_document(json!({"a": 1})).is_ok());
        assert!(decode_document(json!(r#"{"a": 1}"#)).is_ok());
        assert!(matches!(
            decode_document(json!(7)),
            Err(DocMeshError::InvalidDocument(_))
        ));
        assert!(matches!(
            decode_document(json!("{broken")),
            Err(DocMeshError::Serialization(_))
        ));
    }
}
