//! # Forking jobs: fan internal work out across a nested bounded pool.
//!
//! A job that implements [`ForkWork`] gets the push+drain execution flow via
//! the [`ForkingJob`] adapter:
//!
//! ```text
//! ForkingJob::start()
//!   ├─► open a private WorkerPool with one bucket (concurrency = num_workers)
//!   ├─► create_work(&sink)      job pushes items in batches of any size,
//!   │                           any number of times; the sink re-chunks
//!   │                           into max_items_per_worker-sized payloads
//!   ├─► flush remainder
//!   ├─► drain()                 blocks until every sub-worker exited
//!   └─► cleanup()               exactly once, in the owning context,
//!                               even when sub-workers failed
//! ```
//!
//! Each sub-worker receives one batch and calls
//! [`process_work`](ForkWork::process_work); errors there are caught at the
//! worker boundary, logged, and reported as `Failed` exits — they never
//! reach the parent scheduler.
//!
//! The capability is declared by wrapping the implementor at registration:
//! `ForkingJob::arc(MyJob)` is the factory's `JobRef`. Dispatch stays
//! uniform; the scheduler only ever sees [`Job::start`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{JobError, PoolError};
use crate::events::Bus;
use crate::jobs::definition::DEFAULT_MAX_RUN_TIME;
use crate::jobs::job::Job;
use crate::pool::WorkerPool;

/// Bucket key of the single bucket inside a forking job's private pool.
const WORK_BUCKET: &str = "work";

/// Sizing knobs for a forking job's nested pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkConfig {
    /// Upper bound of concurrently running sub-workers.
    pub num_workers: usize,
    /// Number of work items handed to one sub-worker as a single batch.
    pub max_items_per_worker: usize,
    /// Max run time of one sub-worker before forced termination.
    pub work_timeout: Duration,
}

impl Default for ForkConfig {
    /// 10 sub-workers, 500 items per worker, 2-day sub-worker timeout.
    fn default() -> Self {
        Self {
            num_workers: 10,
            max_items_per_worker: 500,
            work_timeout: DEFAULT_MAX_RUN_TIME,
        }
    }
}

/// # The ForkCapable side of a job.
///
/// Implementors describe how to generate work items, how to process one
/// batch, and what to do after every sub-worker has exited. Wrap the
/// implementor in [`ForkingJob`] to obtain a [`Job`] the scheduler can run.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use jobrunner::{ForkWork, JobError, WorkSink};
///
/// struct Reindex;
///
/// #[async_trait]
/// impl ForkWork for Reindex {
///     type Item = String;
///
///     async fn create_work(&self, sink: &WorkSink<'_, String>) -> Result<(), JobError> {
///         sink.add_work((0..100).map(|i| format!("doc-{i}")))
///             .map_err(JobError::fail)
///     }
///
///     async fn process_work(&self, batch: Vec<String>) -> Result<(), JobError> {
///         // index the batch...
///         let _ = batch;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ForkWork: Send + Sync + 'static {
    /// One unit of internally generated work.
    type Item: Clone + Send + 'static;

    /// Pool sizing; the default mirrors the crate defaults.
    fn fork_config(&self) -> ForkConfig {
        ForkConfig::default()
    }

    /// Generates work units by calling [`WorkSink::add_work`] any number of
    /// times with batches of any size. Call it once with everything or many
    /// times incrementally; the sink re-chunks either way.
    async fn create_work(&self, sink: &WorkSink<'_, Self::Item>) -> Result<(), JobError>;

    /// Processes one batch inside a sub-worker. Errors are caught at the
    /// worker boundary and reported as `Failed`; they never propagate.
    async fn process_work(&self, batch: Vec<Self::Item>) -> Result<(), JobError>;

    /// Invoked exactly once after the nested pool drained, in the context
    /// that owns the pool, regardless of sub-worker failures.
    async fn cleanup(&self) {}
}

/// Collects pushed work items and submits them to the nested pool in
/// `max_items_per_worker`-sized batches. The remainder is flushed after
/// generation finishes.
pub struct WorkSink<'a, T: Clone + Send + 'static> {
    pool: &'a WorkerPool<Vec<T>>,
    max_items: usize,
    buffer: Mutex<Vec<T>>,
}

impl<'a, T: Clone + Send + 'static> WorkSink<'a, T> {
    fn new(pool: &'a WorkerPool<Vec<T>>, max_items: usize) -> Self {
        Self {
            pool,
            max_items: max_items.max(1),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Appends items to the pending buffer, submitting every full batch to
    /// the pool's queue. Never blocks; nothing runs until the pool ticks.
    pub fn add_work<I>(&self, items: I) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut buf = self.buffer.lock().expect("sink lock poisoned");
        buf.extend(items);
        while buf.len() >= self.max_items {
            let batch: Vec<T> = buf.drain(..self.max_items).collect();
            self.pool.submit(WORK_BUCKET, batch)?;
        }
        Ok(())
    }

    /// Submits the non-full remainder, if any.
    fn flush(&self) -> Result<(), PoolError> {
        let mut buf = self.buffer.lock().expect("sink lock poisoned");
        if buf.is_empty() {
            return Ok(());
        }
        let batch: Vec<T> = buf.drain(..).collect();
        self.pool.submit(WORK_BUCKET, batch)
    }
}

/// Adapter that turns a [`ForkWork`] implementor into a schedulable [`Job`]
/// running the push+drain+cleanup flow.
pub struct ForkingJob<J: ForkWork> {
    inner: Arc<J>,
    bus: Bus,
    poll_interval: Duration,
}

impl<J: ForkWork> ForkingJob<J> {
    /// Wraps a [`ForkWork`] implementor with a private event bus and the
    /// default 100 ms nested polling cadence.
    pub fn new(job: J) -> Self {
        Self {
            inner: Arc::new(job),
            bus: Bus::new(256),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Shorthand for `Arc::new(ForkingJob::new(job))`.
    pub fn arc(job: J) -> Arc<Self> {
        Arc::new(Self::new(job))
    }

    /// Publishes nested-pool events to the given bus (usually the
    /// scheduler's) instead of a private one.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Overrides the nested pool's polling cadence.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl<J: ForkWork> Job for ForkingJob<J> {
    async fn start(&self) -> Result<(), JobError> {
        let cfg = self.inner.fork_config();
        let pool: WorkerPool<Vec<J::Item>> =
            WorkerPool::new(self.bus.clone(), self.poll_interval);
        pool.add_bucket(WORK_BUCKET, cfg.num_workers, cfg.work_timeout);

        let worker = Arc::clone(&self.inner);
        pool.register_entry(move |batch: Vec<J::Item>| {
            let worker = Arc::clone(&worker);
            async move { worker.process_work(batch).await }
        });

        let sink = WorkSink::new(&pool, cfg.max_items_per_worker);
        let generated = self.inner.create_work(&sink).await;
        if let Err(e) = sink.flush() {
            // The bucket is created above, so this cannot fire in practice.
            warn!(error = %e, "failed to flush remaining work items");
        }

        // Drain whatever was queued and run cleanup exactly once, even when
        // generation failed part-way through.
        if let Err(e) = pool.drain(WORK_BUCKET).await {
            warn!(error = %e, "nested pool drain failed");
        }
        debug!("all sub-workers exited");
        self.inner.cleanup().await;

        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Batches {
        items: usize,
        cfg: ForkConfig,
        sizes: Mutex<Vec<usize>>,
        processed: AtomicUsize,
        cleanups: AtomicUsize,
        fail_batches_of: Option<usize>,
    }

    impl Batches {
        fn new(items: usize, num_workers: usize, max_items: usize) -> Self {
            Self {
                items,
                cfg: ForkConfig {
                    num_workers,
                    max_items_per_worker: max_items,
                    work_timeout: Duration::from_secs(60),
                },
                sizes: Mutex::new(Vec::new()),
                processed: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                fail_batches_of: None,
            }
        }
    }

    #[async_trait]
    impl ForkWork for Arc<Batches> {
        type Item = String;

        fn fork_config(&self) -> ForkConfig {
            self.cfg
        }

        async fn create_work(&self, sink: &WorkSink<'_, String>) -> Result<(), JobError> {
            sink.add_work((0..self.items).map(|i| format!("item-{i}")))
                .map_err(JobError::fail)
        }

        async fn process_work(&self, batch: Vec<String>) -> Result<(), JobError> {
            self.sizes.lock().unwrap().push(batch.len());
            if self.fail_batches_of == Some(batch.len()) {
                return Err(JobError::fail("bad batch"));
            }
            self.processed.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn five_hundred_items_make_ten_full_batches() {
        let state = Arc::new(Batches::new(500, 10, 50));
        let job = ForkingJob::new(state.clone()).with_poll_interval(Duration::from_millis(10));

        job.start().await.unwrap();

        let sizes = state.sizes.lock().unwrap();
        assert_eq!(sizes.len(), 10, "exactly 10 sub-workers");
        assert!(sizes.iter().all(|&s| s == 50), "each given 50 items");
        assert_eq!(state.processed.load(Ordering::SeqCst), 500);
        assert_eq!(state.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remainder_batch_is_flushed() {
        let state = Arc::new(Batches::new(23, 4, 10));
        let job = ForkingJob::new(state.clone()).with_poll_interval(Duration::from_millis(10));

        job.start().await.unwrap();

        let mut sizes = state.sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 10, 10], "no item lost or duplicated");
        assert_eq!(state.processed.load(Ordering::SeqCst), 23);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_worker_failure_does_not_stop_siblings_or_cleanup() {
        let mut inner = Batches::new(25, 2, 10);
        inner.fail_batches_of = Some(5); // the remainder batch fails
        let state = Arc::new(inner);
        let job = ForkingJob::new(state.clone()).with_poll_interval(Duration::from_millis(10));

        // Sub-worker failures are reported through the pool, never from start().
        job.start().await.unwrap();

        assert_eq!(state.sizes.lock().unwrap().len(), 3, "all batches attempted");
        assert_eq!(state.processed.load(Ordering::SeqCst), 20);
        assert_eq!(state.cleanups.load(Ordering::SeqCst), 1);
    }

    struct Incremental;

    #[async_trait]
    impl ForkWork for Incremental {
        type Item = u32;

        fn fork_config(&self) -> ForkConfig {
            ForkConfig {
                num_workers: 2,
                max_items_per_worker: 8,
                work_timeout: Duration::from_secs(60),
            }
        }

        async fn create_work(&self, sink: &WorkSink<'_, u32>) -> Result<(), JobError> {
            // Push model: several calls with arbitrary batch sizes.
            sink.add_work(0..7).map_err(JobError::fail)?;
            sink.add_work(7..17).map_err(JobError::fail)?;
            sink.add_work(17..20).map_err(JobError::fail)
        }

        async fn process_work(&self, _batch: Vec<u32>) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn incremental_pushes_rechunk_without_loss() {
        let pool: WorkerPool<Vec<u32>> =
            WorkerPool::new(Bus::new(64), Duration::from_millis(10));
        pool.add_bucket(WORK_BUCKET, 2, Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        pool.register_entry(move |batch: Vec<u32>| {
            let sink_seen = sink_seen.clone();
            async move {
                sink_seen.lock().unwrap().extend(batch);
                Ok(())
            }
        });

        let sink = WorkSink::new(&pool, 8);
        Incremental.create_work(&sink).await.unwrap();
        sink.flush().unwrap();
        pool.drain(WORK_BUCKET).await.unwrap();

        let mut all = seen.lock().unwrap().clone();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }
}
