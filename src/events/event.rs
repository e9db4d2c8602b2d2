//! # Runtime events emitted by the scheduler and worker pools.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Scheduling events**: a job becoming due and being handed to its bucket
//! - **Worker events**: spawn, completion, failure, timeout, spawn failure
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! bucket keys, worker ids, and error text.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use jobrunner::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::JobFailed)
//!     .with_bucket("reindex")
//!     .with_worker(7)
//!     .with_error("boom");
//!
//! assert_eq!(ev.kind, EventKind::JobFailed);
//! assert_eq!(ev.bucket.as_deref(), Some("reindex"));
//! assert_eq!(ev.error.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Scheduling events ===
    /// A job passed its eligibility check and was submitted to its bucket.
    ///
    /// Sets:
    /// - `bucket`: job key
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    JobDispatched,

    // === Worker events ===
    /// A worker was spawned for the next queued payload.
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `worker`: worker id
    /// - `at`, `seq`
    WorkerSpawned,

    /// A worker exited normally with a successful result.
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `worker`: worker id
    /// - `at`, `seq`
    JobCompleted,

    /// A worker exited with an error (job code failed or the worker
    /// panicked; the panic is contained at the task boundary).
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `worker`: worker id
    /// - `error`: failure message
    /// - `at`, `seq`
    JobFailed,

    /// A worker crossed its deadline and was forcibly terminated.
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `worker`: worker id
    /// - `timeout`: the configured max run time
    /// - `at`, `seq`
    JobTimedOut,

    /// A worker could not be created; the payload was dropped.
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `error`: reason
    /// - `at`, `seq`
    SpawnFailed,

    /// A bucket's queue and active set both reached zero during `drain`.
    ///
    /// Sets:
    /// - `bucket`: bucket key
    /// - `at`, `seq`
    BucketDrained,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Bucket (job) key, if applicable.
    pub bucket: Option<Arc<str>>,
    /// Worker id within the owning pool, if applicable.
    pub worker: Option<u64>,
    /// Human-readable error text (failures, spawn errors).
    pub error: Option<Arc<str>>,
    /// Configured max run time, set on timeout events.
    pub timeout: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            bucket: None,
            worker: None,
            error: None,
            timeout: None,
        }
    }

    /// Sets the bucket (job) key.
    pub fn with_bucket(mut self, bucket: impl AsRef<str>) -> Self {
        self.bucket = Some(Arc::from(bucket.as_ref()));
        self
    }

    /// Sets the worker id.
    pub fn with_worker(mut self, worker: u64) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Sets the error text.
    pub fn with_error(mut self, error: impl AsRef<str>) -> Self {
        self.error = Some(Arc::from(error.as_ref()));
        self
    }

    /// Sets the timeout that was exceeded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::JobDispatched);
        let b = Event::now(EventKind::JobDispatched);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_set_fields() {
        let ev = Event::now(EventKind::JobTimedOut)
            .with_bucket("cleanup")
            .with_worker(3)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(ev.bucket.as_deref(), Some("cleanup"));
        assert_eq!(ev.worker, Some(3));
        assert_eq!(ev.timeout, Some(Duration::from_secs(60)));
        assert!(ev.error.is_none());
    }
}
