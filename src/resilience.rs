//! Resilience helpers.
//!
//! | Helper | Used by | Purpose |
//! |--------|---------|---------|
//! | [`Backoff`] | peer store | Space out retries of SQLite writes that hit a busy database |
//! | [`with_deadline`] | replication client | Bound a peer call; an elapsed deadline is a network error |
//! | [`FanOut`] | bootstrap | Cap how many peer calls are in flight at once |
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> docmesh::Result<()> {
//! use docmesh::resilience::{with_deadline, FanOut};
//! use std::time::Duration;
//!
//! let fan_out = FanOut::new(4);
//! let answer = fan_out
//!     .run(with_deadline("http://peer", "ping", Duration::from_secs(1), async { Ok(42) }))
//!     .await??;
//! # Ok(())
//! # }
//! ```

use crate::error::{DocMeshError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Total tries, the first one included.
    pub attempts: usize,
    /// Wait before the first retry.
    pub first: Duration,
    /// No wait is ever longer than this.
    pub ceiling: Duration,
    /// Growth per retry.
    pub factor: f64,
}

impl Default for Backoff {
    /// SQLite lock contention clears quickly: short waits, few tries.
    fn default() -> Self {
        Self {
            attempts: 5,
            first: Duration::from_millis(10),
            ceiling: Duration::from_millis(500),
            factor: 2.0,
        }
    }
}

impl Backoff {
    /// Near-zero waits for tests.
    pub fn fast() -> Self {
        Self {
            attempts: 3,
            first: Duration::from_millis(1),
            ceiling: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Wait before retry number `retry` (1 is the first retry).
    pub fn wait(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.ceiling.as_secs_f64()).max(0.0))
    }

    /// The waits between tries, in order. Yields `attempts - 1` values.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.attempts).map(move |retry| self.wait(retry))
    }
}

/// Run a peer call with a deadline.
///
/// An elapsed deadline becomes a [`DocMeshError::Network`] for `peer`, so the
/// caller fails over exactly as for any other network failure.
pub async fn with_deadline<T, F>(peer: &str, operation: &str, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, call).await.unwrap_or_else(|_| {
        Err(DocMeshError::network(
            peer,
            format!("{} timed out after {:?}", operation, deadline),
        ))
    })
}

/// Concurrency cap for fan-out calls.
#[derive(Debug)]
pub struct FanOut {
    slots: Semaphore,
    width: usize,
}

impl FanOut {
    /// At most `width` tasks run at once. A width of 0 is treated as 1.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            slots: Semaphore::new(width),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Slots not currently taken.
    pub fn idle(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `task` once a slot is free, releasing the slot when it finishes.
    pub async fn run<F: Future>(&self, task: F) -> Result<F::Output> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| DocMeshError::Internal("fan-out limiter closed".to_string()))?;
        Ok(task.await)
    }
}
