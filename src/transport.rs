// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Peer wire protocol.
//!
//! | Operation  | Method | Path                 | Body / Response                     |
//! |------------|--------|----------------------|-------------------------------------|
//! | list peers | GET    | `/api/peers`         | → `{"peers": [string]}`             |
//! | write      | PUT    | `/api/put`           | `{"key": string, "value": string}`  |
//! | read       | GET    | `/api/get?key=<key>` | → JSON document (or JSON string)    |
//!
//! [`PeerTransport`] is the seam the replication client talks through;
//! [`HttpTransport`] implements it over HTTP with `reqwest`.

use crate::error::{DocMeshError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::trace;

/// Boxed future returned by transport calls.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Body of a write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutPayload {
    pub key: String,
    /// The document as JSON text.
    pub value: String,
}

/// Response of the list-peers call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    #[serde(default)]
    pub peers: Vec<String>,
}

/// How the replication client reaches peers.
///
/// Failures must surface as [`DocMeshError::Network`] so the client can fail
/// over to the next peer.
pub trait PeerTransport: Send + Sync + 'static {
    /// Fetch the peer list advertised by a bootstrap node.
    fn list_peers<'a>(&'a self, bootstrap_url: &'a str) -> TransportFuture<'a, Vec<String>>;

    /// Store a value on a peer. Success means the peer acknowledged it.
    fn put<'a>(&'a self, peer: &'a str, payload: &'a PutPayload) -> TransportFuture<'a, ()>;

    /// Read the raw JSON body stored under `key` on a peer.
    fn get<'a>(&'a self, peer: &'a str, key: &'a str) -> TransportFuture<'a, serde_json::Value>;
}

/// HTTP implementation of [`PeerTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocMeshError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn network_error(peer: &str, e: reqwest::Error) -> DocMeshError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        e.to_string()
    };
    DocMeshError::network(peer, message)
}

impl PeerTransport for HttpTransport {
    fn list_peers<'a>(&'a self, bootstrap_url: &'a str) -> TransportFuture<'a, Vec<String>> {
        Box::pin(async move {
            let start = Instant::now();
            let response = self
                .client
                .get(endpoint(bootstrap_url, "/api/peers"))
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| network_error(bootstrap_url, e))?;
            let list: PeerList = response.json().await.map_err(|e| network_error(bootstrap_url, e))?;

            crate::metrics::record_peer_operation_latency(bootstrap_url, "list_peers", start.elapsed());
            trace!(bootstrap = %bootstrap_url, count = list.peers.len(), "Fetched peer list");
            Ok(list.peers)
        })
    }

    fn put<'a>(&'a self, peer: &'a str, payload: &'a PutPayload) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let start = Instant::now();
            self.client
                .put(endpoint(peer, "/api/put"))
                .json(payload)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| network_error(peer, e))?;

            crate::metrics::record_peer_operation_latency(peer, "put", start.elapsed());
            Ok(())
        })
    }

    fn get<'a>(&'a self, peer: &'a str, key: &'a str) -> TransportFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let start = Instant::now();
            let response = self
                .client
                .get(endpoint(peer, "/api/get"))
                .query(&[("key", key)])
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| network_error(peer, e))?;
            let body: serde_json::Value = response.json().await.map_err(|e| network_error(peer, e))?;

            crate::metrics::record_peer_operation_latency(peer, "get", start.elapsed());
            Ok(body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(endpoint("http://peer:8080/", "/api/put"), "http://peer:8080/api/put");
        assert_eq!(endpoint("http://peer:8080", "/api/get"), "http://peer:8080/api/get");
    }

    #[test]
    fn test_put_payload_wire_shape() {
        let payload = PutPayload {
            key: "doc-1".to_string(),
            value: r#"{"a":1}"#.to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"key": "doc-1", "value": "{\"a\":1}"}));
    }

    #[test]
    fn test_peer_list_decodes() {
        let list: PeerList = serde_json::from_str(r#"{"peers": ["http://a", "http://b"]}"#).unwrap();
        assert_eq!(list.peers, vec!["http://a", "http://b"]);

        let empty: PeerList = serde_json::from_str("{}").unwrap();
        assert!(empty.peers.is_empty());
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_network_error() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();
        // Port 9 on localhost is the discard port and is normally closed.
        let err = transport.get("http://127.0.0.1:9", "k").await.unwrap_err();
        assert!(matches!(err, DocMeshError::Network { .. }));
        assert!(err.is_retryable());
    }
}
