//! # WorkerPool: generic bounded-concurrency bucket engine.
//!
//! The pool manages named buckets, each a bounded worker set with a FIFO
//! work queue, deadline enforcement, and exit reporting. It is used twice
//! in this crate:
//! - by the [`Scheduler`](crate::Scheduler), one bucket per job key at
//!   concurrency 1 (serializing reruns of the same job), and
//! - by forking jobs, one private pool per running instance to spread
//!   internally generated work across bounded sub-workers.
//!
//! ## Lifecycle
//! ```text
//! submit(bucket, payload) ──► [queue]                (never blocks)
//!
//! tick():
//!   reap:  for each active worker
//!            ├─ finished        → join, invoke exit (Completed/Failed)
//!            └─ past deadline   → abort, join, invoke exit (TimedOut)
//!   spawn: while active < max_concurrency and queue non-empty
//!            ├─ entry registered → tokio::spawn(entry(payload))
//!            └─ entry missing    → exit (SpawnError), payload dropped
//!
//! drain(bucket): tick + sleep(poll_interval) until queue and active empty
//! ```
//!
//! ## Rules
//! - Bucket state is mutated only here; callers use the public operations.
//! - No lock is held across an await; exit callbacks and events fire in the
//!   caller's context with the lock released.
//! - A worker panic is contained by the task boundary and surfaces as
//!   `ExitStatus::Failed(JobError::Panicked)`; it can never corrupt or
//!   terminate the pool.
//! - Deadline crossings are detected on the polling cadence, so a stuck
//!   worker is killed and reaped within one `poll_interval` of its
//!   deadline. The kill is unconditional; there is no graceful signal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinError;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::error::{JobError, PoolError};
use crate::events::{Bus, Event, EventKind};
use crate::pool::bucket::{ActiveWorker, Bucket, ExitStatus, WorkerExit, WorkerId};

/// Worker body: turns one payload into a future executed inside the worker.
pub type EntryFn<P> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// Exit callback: invoked in the owning context for every reaped or refused
/// worker.
pub type ExitFn<P> = Arc<dyn Fn(&WorkerExit<P>) + Send + Sync>;

/// A worker taken out of a bucket during reaping, resolved outside the lock.
struct Reaped<P> {
    bucket: String,
    id: WorkerId,
    payload: P,
    join: tokio::task::JoinHandle<Result<(), JobError>>,
    timed_out: bool,
    max_run_time: Duration,
}

/// Generic bounded worker-pool over payloads `P`.
///
/// `P` is `String` (the job key) for scheduler buckets and a `Vec` of work
/// items for nested pools inside forking jobs.
pub struct WorkerPool<P> {
    buckets: Mutex<HashMap<String, Bucket<P>>>,
    entry: OnceLock<EntryFn<P>>,
    exit: OnceLock<ExitFn<P>>,
    bus: Bus,
    poll_interval: Duration,
    next_worker: AtomicU64,
}

impl<P: Clone + Send + 'static> WorkerPool<P> {
    /// Creates an empty pool publishing to `bus`, polling at `poll_interval`.
    pub fn new(bus: Bus, poll_interval: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            entry: OnceLock::new(),
            exit: OnceLock::new(),
            bus,
            poll_interval,
            next_worker: AtomicU64::new(0),
        }
    }

    /// Registers the worker entry callback. Set once; later calls are
    /// ignored with a warning.
    pub fn register_entry<F, Fut>(&self, f: F)
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let wrapped: EntryFn<P> = Arc::new(move |payload| Box::pin(f(payload)) as BoxFuture<_>);
        if self.entry.set(wrapped).is_err() {
            warn!("entry callback already registered, ignoring");
        }
    }

    /// Registers the exit callback. Set once; later calls are ignored with
    /// a warning.
    pub fn register_exit<F>(&self, f: F)
    where
        F: Fn(&WorkerExit<P>) + Send + Sync + 'static,
    {
        if self.exit.set(Arc::new(f)).is_err() {
            warn!("exit callback already registered, ignoring");
        }
    }

    /// Creates a bucket. Idempotent: an existing bucket is left untouched.
    pub fn add_bucket(&self, key: &str, max_concurrency: usize, max_run_time: Duration) {
        let mut buckets = self.buckets.lock().expect("pool lock poisoned");
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(max_concurrency, max_run_time));
    }

    /// True if the bucket exists.
    pub fn has_bucket(&self, key: &str) -> bool {
        self.buckets
            .lock()
            .expect("pool lock poisoned")
            .contains_key(key)
    }

    /// Enqueues a payload on the named bucket. Never blocks; the payload is
    /// picked up by a later [`tick`](Self::tick).
    pub fn submit(&self, bucket: &str, payload: P) -> Result<(), PoolError> {
        let mut buckets = self.buckets.lock().expect("pool lock poisoned");
        match buckets.get_mut(bucket) {
            Some(b) => {
                b.queue.push_back(payload);
                Ok(())
            }
            None => Err(PoolError::UnknownBucket {
                bucket: bucket.to_string(),
            }),
        }
    }

    /// Number of currently active workers in the bucket (0 if unknown).
    pub fn work_running(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .expect("pool lock poisoned")
            .get(bucket)
            .map_or(0, |b| b.active.len())
    }

    /// Number of queued, not-yet-spawned payloads in the bucket (0 if unknown).
    pub fn work_queued(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .expect("pool lock poisoned")
            .get(bucket)
            .map_or(0, |b| b.queue.len())
    }

    /// True when the bucket has neither queued payloads nor active workers.
    /// Unknown buckets are reported idle.
    pub fn is_idle(&self, bucket: &str) -> bool {
        self.buckets
            .lock()
            .expect("pool lock poisoned")
            .get(bucket)
            .map_or(true, |b| b.is_idle())
    }

    /// One spawn/reap pass over every bucket.
    ///
    /// Reaps finished workers, hard-kills workers past their deadline, then
    /// spawns workers for queued payloads up to each bucket's concurrency
    /// bound. Exit callbacks and bus events fire here, in the calling
    /// context, with the internal lock released.
    pub async fn tick(&self) {
        let reaped = self.collect_reapable();
        for item in reaped {
            self.resolve_exit(item).await;
        }
        self.spawn_ready();
    }

    /// Blocks the calling task until the bucket's queue and active set are
    /// both empty, ticking the pool on its polling cadence.
    ///
    /// This is the only blocking call in the engine; the scheduler never
    /// uses it, nested pools use it so a forking job's `start()` does not
    /// return before its sub-workers finish.
    pub async fn drain(&self, bucket: &str) -> Result<(), PoolError> {
        if !self.has_bucket(bucket) {
            return Err(PoolError::UnknownBucket {
                bucket: bucket.to_string(),
            });
        }
        loop {
            self.tick().await;
            if self.is_idle(bucket) {
                self.bus
                    .publish(Event::now(EventKind::BucketDrained).with_bucket(bucket));
                return Ok(());
            }
            time::sleep(self.poll_interval).await;
        }
    }

    /// Hard-kills every active worker and discards all queued payloads.
    /// No exit callbacks fire; this is the shutdown path.
    pub fn abort_all(&self) {
        let mut buckets = self.buckets.lock().expect("pool lock poisoned");
        for bucket in buckets.values_mut() {
            for (_, worker) in bucket.active.drain() {
                worker.join.abort();
            }
            bucket.queue.clear();
        }
    }

    /// Takes finished and expired workers out of their buckets.
    ///
    /// Expired workers are aborted here; their handles settle immediately
    /// and are awaited by the caller outside the lock.
    fn collect_reapable(&self) -> Vec<Reaped<P>> {
        let now = Instant::now();
        let mut out = Vec::new();
        let mut buckets = self.buckets.lock().expect("pool lock poisoned");

        for (key, bucket) in buckets.iter_mut() {
            let due: Vec<WorkerId> = bucket
                .active
                .iter()
                .filter(|(_, w)| w.join.is_finished() || now >= w.deadline)
                .map(|(id, _)| *id)
                .collect();

            for id in due {
                let worker = bucket.active.remove(&id).expect("worker vanished");
                let timed_out = !worker.join.is_finished();
                if timed_out {
                    worker.join.abort();
                }
                out.push(Reaped {
                    bucket: key.clone(),
                    id,
                    payload: worker.payload,
                    join: worker.join,
                    timed_out,
                    max_run_time: bucket.max_run_time,
                });
            }
        }
        out
    }

    /// Awaits one settled handle, classifies the outcome, publishes the
    /// matching event, and invokes the exit callback.
    async fn resolve_exit(&self, item: Reaped<P>) {
        let status = match item.join.await {
            Ok(Ok(())) => ExitStatus::Completed,
            Ok(Err(e)) => ExitStatus::Failed(e),
            Err(join_err) if item.timed_out && join_err.is_cancelled() => ExitStatus::TimedOut {
                after: item.max_run_time,
            },
            Err(join_err) => ExitStatus::Failed(JobError::Panicked {
                error: panic_message(join_err),
            }),
        };

        let ev = match &status {
            ExitStatus::Completed => Event::now(EventKind::JobCompleted),
            ExitStatus::Failed(e) => Event::now(EventKind::JobFailed).with_error(e.to_string()),
            ExitStatus::TimedOut { after } => {
                Event::now(EventKind::JobTimedOut).with_timeout(*after)
            }
            // SpawnError never reaches here; refused payloads are reported
            // from spawn_ready.
            ExitStatus::SpawnError { reason } => {
                Event::now(EventKind::SpawnFailed).with_error(reason.clone())
            }
        };
        self.bus
            .publish(ev.with_bucket(&item.bucket).with_worker(item.id.0));

        let exit = WorkerExit {
            worker: item.id,
            bucket: item.bucket,
            payload: item.payload,
            status,
        };
        if let Some(cb) = self.exit.get() {
            cb(&exit);
        }
        debug!(
            bucket = %exit.bucket,
            worker = %exit.worker,
            status = exit.status.as_label(),
            "worker reaped"
        );
    }

    /// Spawns workers for queued payloads up to each bucket's bound.
    fn spawn_ready(&self) {
        let entry = self.entry.get().cloned();
        let mut spawned: Vec<(String, WorkerId)> = Vec::new();
        let mut refused: Vec<(String, WorkerId, P)> = Vec::new();

        {
            let mut buckets = self.buckets.lock().expect("pool lock poisoned");
            for (key, bucket) in buckets.iter_mut() {
                while bucket.active.len() < bucket.max_concurrency && !bucket.queue.is_empty() {
                    let payload = bucket.queue.pop_front().expect("queue checked non-empty");
                    let id = WorkerId(self.next_worker.fetch_add(1, AtomicOrdering::Relaxed));

                    let Some(entry) = entry.clone() else {
                        refused.push((key.clone(), id, payload));
                        continue;
                    };

                    let body_payload = payload.clone();
                    // The entry closure runs inside the spawned task so a
                    // panic while building the future is contained too.
                    let join = tokio::spawn(async move { entry(body_payload).await });
                    bucket.active.insert(
                        id,
                        ActiveWorker {
                            payload,
                            deadline: Instant::now() + bucket.max_run_time,
                            join,
                        },
                    );
                    spawned.push((key.clone(), id));
                }
            }
        }

        for (bucket, id) in spawned {
            self.bus.publish(
                Event::now(EventKind::WorkerSpawned)
                    .with_bucket(&bucket)
                    .with_worker(id.0),
            );
        }
        for (bucket, id, payload) in refused {
            let reason = "no entry callback registered".to_string();
            warn!(bucket = %bucket, "spawn refused: {reason}");
            self.bus.publish(
                Event::now(EventKind::SpawnFailed)
                    .with_bucket(&bucket)
                    .with_error(&reason),
            );
            let exit = WorkerExit {
                worker: id,
                bucket,
                payload,
                status: ExitStatus::SpawnError { reason },
            };
            if let Some(cb) = self.exit.get() {
                cb(&exit);
            }
        }
    }
}

/// Best-effort extraction of a panic payload from a settled join error.
fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(panic) => {
            if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "opaque panic payload".to_string()
            }
        }
        Err(_) => "worker cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn pool() -> WorkerPool<String> {
        WorkerPool::new(Bus::new(64), Duration::from_millis(10))
    }

    fn collect_exits(p: &WorkerPool<String>) -> Arc<Mutex<Vec<(String, &'static str)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        p.register_exit(move |exit: &WorkerExit<String>| {
            sink.lock()
                .unwrap()
                .push((exit.bucket.clone(), exit.status.as_label()));
        });
        seen
    }

    #[tokio::test]
    async fn submit_to_unknown_bucket_fails() {
        let p = pool();
        let err = p.submit("nope", "x".into()).unwrap_err();
        assert_eq!(err.as_label(), "unknown_bucket");
    }

    #[tokio::test]
    async fn add_bucket_is_idempotent() {
        let p = pool();
        p.add_bucket("b", 1, Duration::from_secs(1));
        p.submit("b", "x".into()).unwrap();
        p.add_bucket("b", 5, Duration::from_secs(9));
        assert_eq!(p.work_queued("b"), 1, "existing bucket must be untouched");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_per_bucket() {
        let p = pool();
        p.add_bucket("b", 2, Duration::from_secs(3600));
        p.register_entry(|_payload: String| async {
            time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });
        let exits = collect_exits(&p);

        for i in 0..5 {
            p.submit("b", format!("w{i}")).unwrap();
        }
        p.tick().await;
        assert_eq!(p.work_running("b"), 2);
        assert_eq!(p.work_queued("b"), 3);

        p.drain("b").await.unwrap();
        assert_eq!(p.work_running("b"), 0);
        assert_eq!(p.work_queued("b"), 0);
        let exits = exits.lock().unwrap();
        assert_eq!(exits.len(), 5);
        assert!(exits.iter().all(|(_, label)| *label == "completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_worker_is_killed_and_reaped() {
        let p = pool();
        p.add_bucket("slow", 1, Duration::from_secs(1));
        p.register_entry(|_payload: String| async {
            time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let exits = collect_exits(&p);

        p.submit("slow", "x".into()).unwrap();
        p.tick().await;
        assert_eq!(p.work_running("slow"), 1);

        time::sleep(Duration::from_secs(2)).await;
        p.tick().await;

        assert_eq!(p.work_running("slow"), 0, "no operator intervention needed");
        assert_eq!(
            exits.lock().unwrap().as_slice(),
            &[("slow".to_string(), "timed_out")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_is_contained() {
        let p = pool();
        p.add_bucket("b", 1, Duration::from_secs(60));
        p.register_entry(|payload: String| async move {
            if payload == "bad" {
                panic!("worker exploded");
            }
            Ok(())
        });
        let exits = collect_exits(&p);

        p.submit("b", "bad".into()).unwrap();
        p.drain("b").await.unwrap();
        p.submit("b", "good".into()).unwrap();
        p.drain("b").await.unwrap();

        assert_eq!(
            exits.lock().unwrap().as_slice(),
            &[
                ("b".to_string(), "failed"),
                ("b".to_string(), "completed"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_entry_reports_failed_exit() {
        let p = pool();
        p.add_bucket("b", 1, Duration::from_secs(60));
        p.register_entry(|_payload: String| async { Err(JobError::fail("boom")) });
        let exits = collect_exits(&p);

        p.submit("b", "x".into()).unwrap();
        p.drain("b").await.unwrap();
        assert_eq!(
            exits.lock().unwrap().as_slice(),
            &[("b".to_string(), "failed")]
        );
    }

    #[tokio::test]
    async fn missing_entry_is_a_spawn_error_and_drops_payload() {
        let p = pool();
        p.add_bucket("b", 1, Duration::from_secs(60));
        let exits = collect_exits(&p);

        p.submit("b", "x".into()).unwrap();
        p.tick().await;

        assert_eq!(p.work_running("b"), 0);
        assert_eq!(p.work_queued("b"), 0, "payload dropped, not requeued");
        assert_eq!(
            exits.lock().unwrap().as_slice(),
            &[("b".to_string(), "spawn_error")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drain_processes_everything_exactly_once() {
        let p: WorkerPool<u64> = WorkerPool::new(Bus::new(64), Duration::from_millis(10));
        p.add_bucket("n", 3, Duration::from_secs(60));
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        p.register_entry(move |_payload: u64| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            }
        });

        for i in 0..10u64 {
            p.submit("n", i).unwrap();
        }
        p.drain("n").await.unwrap();
        assert_eq!(done.load(AtomicOrdering::SeqCst), 10);
        assert!(p.is_idle("n"));
    }
}
