//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Query executions (scanned, matched, returned, latency)
//! - Reference resolution
//! - Backup sends and quorum outcomes
//! - Retrieve attempts and outcomes
//! - Bootstrap rounds and the known-peer count
//! - Peer store SQLite contention
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `docmesh_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use docmesh::metrics;
//! use std::time::Duration;
//!
//! metrics::record_query("users", 120, 7, 5, Duration::from_millis(3));
//! metrics::record_backup_send("http://peer-1", true);
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Query Engine
// =============================================================================

/// Record a completed query execution.
pub fn record_query(
    collection: &str,
    scanned: usize,
    matched: usize,
    returned: usize,
    duration: Duration,
) {
    let collection = collection.to_string();
    counter!("docmesh_query_executions_total", "collection" => collection.clone()).increment(1);
    counter!("docmesh_query_scanned_total", "collection" => collection.clone()).increment(scanned as u64);
    counter!("docmesh_query_matched_total", "collection" => collection.clone()).increment(matched as u64);
    histogram!("docmesh_query_returned", "collection" => collection.clone()).record(returned as f64);
    histogram!("docmesh_query_duration_seconds", "collection" => collection).record(duration.as_secs_f64());
}

/// Record a query that ended in an error.
pub fn record_query_error(collection: &str, error_kind: &str) {
    counter!(
        "docmesh_query_errors_total",
        "collection" => collection.to_string(),
        "error_type" => error_kind.to_string()
    )
    .increment(1);
}

/// Record one reference lookup against the graph store.
///
/// `outcome` is one of `resolved`, `missing`, `error`.
pub fn record_reference_resolution(outcome: &str) {
    counter!("docmesh_reference_resolutions_total", "outcome" => outcome.to_string()).increment(1);
}

// =============================================================================
// Replication Client
// =============================================================================

/// Record a single backup PUT to a peer.
pub fn record_backup_send(peer: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("docmesh_backup_sends_total", "peer" => peer.to_string(), "status" => status).increment(1);
}

/// Record the outcome of a whole backup call.
pub fn record_backup_outcome(quorum_reached: bool, acknowledged: usize, attempts: usize) {
    let outcome = if quorum_reached { "quorum" } else { "partial" };
    counter!("docmesh_backups_total", "outcome" => outcome).increment(1);
    histogram!("docmesh_backup_acknowledged").record(acknowledged as f64);
    histogram!("docmesh_backup_attempts").record(attempts as f64);
}

/// Record a single retrieve GET to a peer.
pub fn record_retrieve_attempt(peer: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("docmesh_retrieve_attempts_total", "peer" => peer.to_string(), "status" => status).increment(1);
}

/// Record the outcome of a whole retrieve call.
pub fn record_retrieve_outcome(success: bool, attempts: usize) {
    let outcome = if success { "success" } else { "exhausted" };
    counter!("docmesh_retrieves_total", "outcome" => outcome).increment(1);
    histogram!("docmesh_retrieve_attempts").record(attempts as f64);
}

/// Record a bootstrap round.
pub fn record_bootstrap(contacted: usize, failed: usize, added: usize, duration: Duration) {
    counter!("docmesh_bootstrap_rounds_total").increment(1);
    counter!("docmesh_bootstrap_nodes_contacted_total").increment(contacted as u64);
    if failed > 0 {
        counter!("docmesh_bootstrap_nodes_failed_total").increment(failed as u64);
    }
    counter!("docmesh_bootstrap_peers_added_total").increment(added as u64);
    histogram!("docmesh_bootstrap_duration_seconds").record(duration.as_secs_f64());
}

/// Gauge for number of known peers.
pub fn set_known_peers(count: usize) {
    gauge!("docmesh_known_peers").set(count as f64);
}

/// Record peer operation latency by operation type (put, get, list_peers).
pub fn record_peer_operation_latency(peer: &str, operation: &str, duration: Duration) {
    histogram!(
        "docmesh_peer_operation_duration_seconds",
        "peer" => peer.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Peer Store
// =============================================================================

/// Record peer store SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn peer_store_retries_total(operation: &str) {
    counter!("docmesh_peer_store_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a registry slot write.
pub fn record_registry_persist(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("docmesh_registry_persists_total", "status" => status).increment(1);
}
