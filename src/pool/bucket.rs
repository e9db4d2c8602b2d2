//! # Bucket state: queue, active workers, exit reporting types.
//!
//! A bucket is a named, bounded-concurrency worker set inside a
//! [`WorkerPool`](crate::pool::WorkerPool): a FIFO queue of pending
//! payloads plus a map of active workers with their start times and
//! deadlines. Bucket internals are mutated exclusively by the pool's own
//! spawn/reap logic; callers only go through the pool's public operations.
//!
//! This module also defines the types the pool hands to exit callbacks:
//! [`WorkerId`], [`ExitStatus`], and [`WorkerExit`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::JobError;

/// Identifier of a worker within one pool, unique for the pool's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a worker, reported through the pool's exit callback.
#[derive(Debug, Clone)]
pub enum ExitStatus {
    /// The worker ran the entry callback to completion with `Ok`.
    Completed,
    /// The entry callback returned an error, or the worker panicked and the
    /// panic was contained at the task boundary.
    Failed(JobError),
    /// The worker crossed its deadline and was forcibly terminated.
    TimedOut {
        /// The bucket's configured max run time.
        after: Duration,
    },
    /// No worker was ever created for the payload; the payload is dropped
    /// and not requeued.
    SpawnError {
        /// Why the spawn was refused.
        reason: String,
    },
}

impl ExitStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitStatus::Completed => "completed",
            ExitStatus::Failed(_) => "failed",
            ExitStatus::TimedOut { .. } => "timed_out",
            ExitStatus::SpawnError { .. } => "spawn_error",
        }
    }

    /// True only for a normal, successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Completed)
    }
}

/// Everything the pool knows about one finished (or refused) worker,
/// passed by reference to the registered exit callback.
#[derive(Debug)]
pub struct WorkerExit<P> {
    /// Worker id; meaningless for `SpawnError` (no worker existed).
    pub worker: WorkerId,
    /// The bucket the payload was submitted to.
    pub bucket: String,
    /// The payload the worker was bound to.
    pub payload: P,
    /// How the worker ended.
    pub status: ExitStatus,
}

/// One running worker: payload, deadline, and the join handle used to reap it.
pub(crate) struct ActiveWorker<P> {
    pub payload: P,
    pub deadline: Instant,
    pub join: JoinHandle<Result<(), JobError>>,
}

/// Named bounded-concurrency worker set with a FIFO work queue.
pub(crate) struct Bucket<P> {
    pub max_concurrency: usize,
    pub max_run_time: Duration,
    pub queue: VecDeque<P>,
    pub active: HashMap<WorkerId, ActiveWorker<P>>,
}

impl<P> Bucket<P> {
    pub fn new(max_concurrency: usize, max_run_time: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            max_run_time,
            queue: VecDeque::new(),
            active: HashMap::new(),
        }
    }

    /// True when both the queue and the active set are empty.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty()
    }
}
