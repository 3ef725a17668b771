// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite persistence for the peer registry.
//!
//! The registry lives in a named slot (default `peers`) holding the peer set as
//! a JSON list of endpoint strings:
//!
//! ```text
//! registry_slots
//! ┌────────┬──────────────────────────────────┬──────────────┐
//! │ slot   │ value                            │ updated_at   │
//! ├────────┼──────────────────────────────────┼──────────────┤
//! │ peers  │ ["http://a:8765","http://b:8765"]│ 1718000000000│
//! └────────┴──────────────────────────────────┴──────────────┘
//! ```
//!
//! The slot is loaded at startup and overwritten after every bootstrap merge.
//!
//! # Lock Contention
//!
//! Another process holding the same database file makes writes fail with
//! SQLITE_BUSY or SQLITE_LOCKED. Those writes are repeated on the
//! [`Backoff`] schedule; every other error is returned at once.

use crate::config::RegistryConfig;
use crate::error::{DocMeshError, Result};
use crate::resilience::Backoff;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Whether SQLite refused the statement because another connection holds a lock.
fn is_busy(e: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = e else {
        return false;
    };
    match db.code() {
        // Primary codes SQLITE_BUSY (5) and SQLITE_LOCKED (6), extended codes included
        Some(code) => code.parse::<i32>().map(|c| matches!(c & 0xff, 5 | 6)).unwrap_or(false),
        None => {
            let message = db.message().to_ascii_lowercase();
            message.contains("database is locked") || message.contains("database is busy")
        }
    }
}

/// Persistent named-slot storage backed by SQLite.
pub struct PeerStore {
    pool: SqlitePool,
    path: String,
    backoff: Backoff,
}

impl PeerStore {
    /// Open (or create) the store described by `config`.
    pub async fn open(config: &RegistryConfig) -> Result<Self> {
        info!(path = %config.sqlite_path, "Initializing peer store");

        let (options, max_connections) = if config.is_in_memory() {
            // Each connection to :memory: is its own database.
            (SqliteConnectOptions::from_str("sqlite::memory:"), 1)
        } else {
            (
                SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", config.sqlite_path)),
                2,
            )
        };
        let mut options = options
            .map_err(|e| DocMeshError::Config(format!("Invalid SQLite path: {}", e)))?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);
        if config.wal_mode {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS registry_slots (
                slot TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            path: config.sqlite_path.clone(),
            backoff: Backoff::default(),
        })
    }

    /// Override the lock-contention backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run a write, backing off while the database is locked.
    async fn write<T, F, Fut>(&self, label: &'static str, mut op: F) -> std::result::Result<T, sqlx::Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut delays = self.backoff.delays();
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !is_busy(&err) {
                return Err(err);
            }
            let Some(delay) = delays.next() else {
                warn!(op = label, attempts = self.backoff.attempts, "SQLite still busy, giving up");
                return Err(err);
            };
            warn!(op = label, delay_ms = delay.as_millis() as u64, "SQLite busy, backing off");
            crate::metrics::peer_store_retries_total(label);
            tokio::time::sleep(delay).await;
        }
    }

    /// Read a slot. `None` if it was never written.
    pub async fn load(&self, slot: &str) -> Result<Option<Vec<String>>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM registry_slots WHERE slot = ?")
            .bind(slot)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((value,)) => {
                let peers: Vec<String> = serde_json::from_str(&value)?;
                debug!(slot = %slot, count = peers.len(), "Loaded registry slot");
                Ok(Some(peers))
            }
            None => Ok(None),
        }
    }

    /// Overwrite a slot with the given peer list.
    pub async fn save(&self, slot: &str, peers: &[String]) -> Result<()> {
        let value = serde_json::to_string(peers)?;
        let now = chrono::Utc::now().timestamp_millis();
        let pool = &self.pool;

        let result = self.write("slot_save", || async {
            sqlx::query(
                r#"
                INSERT INTO registry_slots (slot, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(slot) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(slot)
            .bind(&value)
            .bind(now)
            .execute(pool)
            .await
        })
        .await;

        crate::metrics::record_registry_persist(result.is_ok());
        result?;
        debug!(slot = %slot, count = peers.len(), "Saved registry slot");
        Ok(())
    }

    /// Remove a slot entirely.
    pub async fn delete(&self, slot: &str) -> Result<()> {
        let pool = &self.pool;
        self.write("slot_delete", || async {
            sqlx::query("DELETE FROM registry_slots WHERE slot = ?")
                .bind(slot)
                .execute(pool)
                .await
        })
        .await?;

        info!(slot = %slot, "Deleted registry slot");
        Ok(())
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;
        self.write("slot_checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
        })
        .await?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint WAL and close the connection pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("Peer store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_config(dir: &tempfile::TempDir, name: &str) -> RegistryConfig {
        RegistryConfig {
            sqlite_path: dir.path().join(name).to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    fn peers(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_slot_loads_none() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap();
        assert_eq!(store.load("peers").await.unwrap(), None);
        store.close().await;
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap();
        store.save("peers", &peers(&["http://a", "http://b"])).await.unwrap();
        assert_eq!(store.load("peers").await.unwrap(), Some(peers(&["http://a", "http://b"])));

        store.save("peers", &peers(&["http://c"])).await.unwrap();
        assert_eq!(store.load("peers").await.unwrap(), Some(peers(&["http://c"])));
        store.close().await;
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap();
        store.save("peers", &peers(&["http://a"])).await.unwrap();
        store.save("staging", &peers(&["http://s"])).await.unwrap();

        store.delete("staging").await.unwrap();
        assert_eq!(store.load("staging").await.unwrap(), None);
        assert_eq!(store.load("peers").await.unwrap(), Some(peers(&["http://a"])));
        store.close().await;
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let config = file_config(&dir, "persist.db");

        {
            let store = PeerStore::open(&config).await.unwrap();
            store.save("peers", &peers(&["http://p1", "http://p2"])).await.unwrap();
            store.close().await;
        }

        {
            let store = PeerStore::open(&config).await.unwrap();
            assert_eq!(
                store.load("peers").await.unwrap(),
                Some(peers(&["http://p1", "http://p2"]))
            );
            assert!(store.path().contains("persist.db"));
            store.close().await;
        }
    }

    #[tokio::test]
    async fn test_checkpoint() {
        let dir = tempdir().unwrap();
        let store = PeerStore::open(&file_config(&dir, "checkpoint.db")).await.unwrap();
        store.save("peers", &peers(&["http://a"])).await.unwrap();
        assert!(store.checkpoint().await.is_ok());
        store.close().await;
    }

    #[tokio::test]
    async fn test_corrupt_slot_is_serialization_error() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO registry_slots (slot, value, updated_at) VALUES ('peers', 'not json', 0)")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.load("peers").await.unwrap_err();
        assert!(matches!(err, DocMeshError::Serialization(_)));
        store.close().await;
    }

    #[tokio::test]
    async fn test_write_returns_first_success() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap().with_backoff(Backoff::fast());
        let mut calls = 0;
        let value = store
            .write("test_op", || {
                calls += 1;
                async { Ok::<_, sqlx::Error>(42) }
            })
            .await
            .unwrap();
        assert_eq!((value, calls), (42, 1));
        store.close().await;
    }

    #[tokio::test]
    async fn test_write_does_not_repeat_other_errors() {
        let store = PeerStore::open(&RegistryConfig::in_memory()).await.unwrap().with_backoff(Backoff::fast());
        let mut calls = 0;
        let result: std::result::Result<(), sqlx::Error> = store
            .write("test_op", || {
                calls += 1;
                async { Err(sqlx::Error::RowNotFound) }
            })
            .await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
        assert_eq!(calls, 1);
        store.close().await;
    }

    #[test]
    fn test_non_database_errors_are_not_busy() {
        assert!(!is_busy(&sqlx::Error::RowNotFound));
        assert!(!is_busy(&sqlx::Error::PoolTimedOut));
    }
}
