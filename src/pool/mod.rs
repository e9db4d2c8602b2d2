//! # Bucket engine: named bounded-concurrency worker sets.
//!
//! A [`WorkerPool`] manages buckets — named FIFO work queues with a bounded
//! set of active workers each — and enforces per-bucket deadlines with
//! forced termination. The same engine serves two layers:
//!
//! ```text
//! Scheduler ──► WorkerPool<String>           one bucket per job key,
//!                                            concurrency 1
//!
//! ForkingJob ─► WorkerPool<Vec<Item>>        one nested bucket per running
//!                                            instance, concurrency N
//! ```
//!
//! Workers are tokio tasks; isolation is panic containment at the task
//! boundary, so a crashing worker can never take down the owning pool or
//! the scheduler.

mod bucket;
#[allow(clippy::module_inception)]
mod pool;

pub use bucket::{ExitStatus, WorkerExit, WorkerId};
pub use pool::{EntryFn, ExitFn, WorkerPool};
