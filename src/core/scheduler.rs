//! # Scheduler: evaluates run-conditions and dispatches jobs to buckets.
//!
//! The [`Scheduler`] owns the [`JobRegistry`] and a `WorkerPool<String>`
//! with one bucket per job key at concurrency 1, which serializes reruns of
//! the same job by construction.
//!
//! ## Tick flow
//! ```text
//! tick_at(now):
//!   for key in registration order:
//!     ├─ disabled?                    → skip
//!     ├─ work_running(key) > 0?       → skip (already running)
//!     ├─ schedule not due?            → skip
//!     └─ due:
//!          ├─ last_start = now        (synchronous, before the spawn,
//!          │                           so no second tick can double-dispatch)
//!          ├─ publish JobDispatched
//!          └─ pool.submit(key, key)   (never blocks)
//!   pool.tick()                       (reap finished/expired, spawn queued)
//! ```
//!
//! ## Eligibility rules
//! 1. `enabled == false` → never.
//! 2. A worker for the key is active → never, regardless of elapsed time.
//! 3. Time-of-day schedule: due iff the current wall-clock HH:MM equals the
//!    target and the last dispatch is unset or at least 60 s ago (prevents
//!    re-firing within the matching minute).
//! 4. Interval schedule: due iff the last dispatch is unset or longer than
//!    the interval ago.
//!
//! One job's evaluation or submit failure is logged and never prevents the
//! remaining jobs in the same tick. The scheduler itself never blocks on a
//! job's completion; the only blocking call in the crate is the nested
//! pool's `drain`, used inside forking jobs.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::context::worker_entry;
use crate::core::registry::{JobFactory, JobRegistry, JobState};
use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{JobOptions, JobRef, Schedule};
use crate::pool::{ExitStatus, WorkerExit, WorkerPool};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Coordinates the job registry, the per-job bucket pool, and event
/// delivery to subscribers.
pub struct Scheduler {
    cfg: SchedulerConfig,
    bus: Bus,
    registry: Arc<JobRegistry>,
    pool: Arc<WorkerPool<String>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Scheduler {
    /// Creates a scheduler: an empty registry and a pool whose entry point
    /// resolves job keys through the registry and whose exit path records
    /// finish times.
    pub fn new(cfg: SchedulerConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let registry = Arc::new(JobRegistry::new());
        let pool = Arc::new(WorkerPool::new(bus.clone(), cfg.poll_interval));

        pool.register_entry(worker_entry(Arc::clone(&registry)));

        let finish_registry = Arc::clone(&registry);
        pool.register_exit(move |exit: &WorkerExit<String>| {
            match &exit.status {
                // No worker ever existed; the payload is dropped and the
                // job stays eligible on its normal schedule.
                ExitStatus::SpawnError { reason } => {
                    warn!(job = %exit.bucket, reason, "spawn failed, payload dropped");
                }
                status => {
                    debug!(job = %exit.bucket, status = status.as_label(), "run finished");
                    if let Err(e) = finish_registry.mark_finished(&exit.bucket, Local::now()) {
                        warn!(job = %exit.bucket, error = %e, "cannot record finish time");
                    }
                }
            }
        });

        Self {
            cfg,
            bus,
            registry,
            pool,
            subscribers: Vec::new(),
        }
    }

    /// Attaches subscribers; the fan-out set is built when [`run`](Self::run)
    /// starts.
    pub fn with_subscribers(mut self, subs: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subs;
        self
    }

    /// The event bus shared by the scheduler and its pool.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registers a job: a registry entry plus a concurrency-1 bucket.
    ///
    /// Identical re-registration is a no-op; a conflicting one fails with
    /// [`SchedulerError::DuplicateJob`]. Jobs are evaluated in the order
    /// they were added.
    pub fn add_job<F>(&self, key: &str, factory: F, options: JobOptions) -> Result<(), SchedulerError>
    where
        F: Fn(Option<DateTime<Local>>) -> JobRef + Send + Sync + 'static,
    {
        let factory: JobFactory = Arc::new(factory);
        let max_run_time = options.max_run_time;
        self.registry.register(key, factory, options)?;
        // Idempotent: a re-registration leaves the existing bucket as-is.
        self.pool.add_bucket(key, 1, max_run_time);
        Ok(())
    }

    /// Snapshot of a job's options and timestamps.
    pub fn job_state(&self, key: &str) -> Result<JobState, SchedulerError> {
        self.registry.state(key)
    }

    /// Number of active workers for a job (0 or 1 at this level).
    pub fn work_running(&self, key: &str) -> usize {
        self.pool.work_running(key)
    }

    /// One evaluation pass over all jobs at the current wall-clock time.
    pub async fn tick(&self) {
        self.tick_at(Local::now()).await;
    }

    /// One evaluation pass with an explicit notion of "now"; the seam used
    /// by tests and callers with their own clock.
    pub async fn tick_at(&self, now: DateTime<Local>) {
        for key in self.registry.keys() {
            let state = match self.registry.state(&key) {
                Ok(state) => state,
                Err(e) => {
                    warn!(job = %key, error = %e, "skipping job this tick");
                    continue;
                }
            };
            if !state.options.enabled {
                continue;
            }
            if self.pool.work_running(&key) > 0 {
                continue;
            }
            if !can_run(&state, now) {
                continue;
            }

            // Written before the spawn is even queued; a re-evaluation in
            // flight sees the fresh timestamp and backs off.
            if let Err(e) = self.registry.mark_started(&key, now) {
                warn!(job = %key, error = %e, "cannot record start time");
                continue;
            }
            debug!(job = %key, "dispatching");
            self.bus
                .publish(Event::now(EventKind::JobDispatched).with_bucket(&key));
            if let Err(e) = self.pool.submit(&key, key.clone()) {
                warn!(job = %key, error = %e, "submit failed");
            }
        }

        self.pool.tick().await;
    }

    /// Drives the scheduler until the token cancels: tick, sleep one poll
    /// interval, repeat. On cancellation every active worker is
    /// hard-killed.
    ///
    /// This is the in-crate driver; an outer daemon loop can equally call
    /// [`tick`](Self::tick) itself.
    pub async fn run(&self, token: CancellationToken) {
        let subs = Arc::new(SubscriberSet::new(self.subscribers.clone()));
        let listener = self.subscriber_listener(Arc::clone(&subs), token.clone());
        info!(jobs = self.registry.len(), "scheduler running");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = time::sleep(self.cfg.poll_interval) => {
                    self.tick().await;
                }
            }
        }

        self.pool.abort_all();
        let _ = listener.await;
        info!("scheduler stopped");
    }

    /// Forwards bus events to the subscriber set until cancellation.
    fn subscriber_listener(
        &self,
        subs: Arc<SubscriberSet>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit(&ev),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}

/// Pure eligibility check against a job's schedule and last dispatch time.
pub(crate) fn can_run(state: &JobState, now: DateTime<Local>) -> bool {
    match state.options.schedule() {
        Schedule::At(at) => {
            if !at.matches(&now) {
                return false;
            }
            // At most one firing per matching calendar minute.
            match state.last_start {
                None => true,
                Some(started) => now.signed_duration_since(started) >= TimeDelta::seconds(60),
            }
        }
        Schedule::Every(interval) => match state.last_start {
            None => true,
            Some(started) => {
                let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
                now.signed_duration_since(started) > interval
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::jobs::JobFn;
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn quick_job(_prev: Option<DateTime<Local>>) -> JobRef {
        JobFn::arc(|| async { Ok::<_, JobError>(()) })
    }

    fn scheduler() -> Scheduler {
        let mut cfg = SchedulerConfig::default();
        cfg.poll_interval = Duration::from_millis(10);
        Scheduler::new(cfg)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 10, h, m, s).unwrap()
    }

    fn dispatches(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ev) if ev.kind == EventKind::JobDispatched => {
                    out.push(ev.bucket.as_deref().unwrap_or("").to_string());
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(_) => break,
            }
        }
        out
    }

    fn state(options: JobOptions, last_start: Option<DateTime<Local>>) -> JobState {
        JobState {
            options,
            last_start,
            last_finish: None,
        }
    }

    #[test]
    fn first_run_is_always_due() {
        let interval = state(JobOptions::default(), None);
        assert!(can_run(&interval, at(3, 0, 0)));

        let tod = state(JobOptions::default().at("12:00").unwrap(), None);
        assert!(can_run(&tod, at(12, 0, 5)));
        assert!(!can_run(&tod, at(12, 1, 0)));
    }

    #[test]
    fn interval_boundary_is_strict() {
        let started = at(10, 0, 0);
        let s = state(
            JobOptions::default().every(Duration::from_secs(100)),
            Some(started),
        );
        assert!(!can_run(&s, at(10, 1, 39)), "t + I - 1s");
        assert!(!can_run(&s, at(10, 1, 40)), "exactly t + I");
        assert!(can_run(&s, at(10, 1, 41)), "t + I + 1s");
    }

    #[test]
    fn time_of_day_fires_once_per_matching_minute() {
        let opts = JobOptions::default().at("12:00").unwrap();
        assert!(can_run(&state(opts.clone(), None), at(12, 0, 0)));
        // Second evaluation inside the same minute, even after the first
        // run finished.
        assert!(!can_run(&state(opts.clone(), Some(at(12, 0, 0))), at(12, 0, 30)));
        // Minute no longer matches.
        assert!(!can_run(&state(opts.clone(), Some(at(12, 0, 0))), at(12, 1, 1)));
        // Next day, same minute.
        let next_day = Local.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        assert!(can_run(&state(opts, Some(at(12, 0, 0))), next_day));
    }

    #[test]
    fn time_of_day_overrides_interval() {
        let opts = JobOptions::default()
            .every(Duration::from_secs(1))
            .at("12:00")
            .unwrap();
        // Interval long since elapsed, but the minute does not match.
        assert!(!can_run(&state(opts, Some(at(1, 0, 0))), at(13, 0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_is_not_redispatched() {
        let sched = scheduler();
        sched
            .add_job(
                "slow",
                |_prev| {
                    JobFn::arc(|| async {
                        time::sleep(Duration::from_secs(3600)).await;
                        Ok::<_, JobError>(())
                    })
                },
                JobOptions::default().every(Duration::ZERO),
            )
            .unwrap();
        let mut rx = sched.bus().subscribe();

        sched.tick_at(at(9, 0, 0)).await;
        assert_eq!(sched.work_running("slow"), 1);
        assert_eq!(dispatches(&mut rx), vec!["slow"]);

        // Hours later, still running: no second dispatch.
        sched.tick_at(at(15, 0, 0)).await;
        assert_eq!(sched.work_running("slow"), 1);
        assert!(dispatches(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_job_is_never_dispatched() {
        let sched = scheduler();
        sched
            .add_job(
                "off",
                quick_job,
                JobOptions::default().every(Duration::ZERO).disabled(),
            )
            .unwrap();
        let mut rx = sched.bus().subscribe();

        for hour in [0, 6, 12, 18] {
            sched.tick_at(at(hour, 0, 0)).await;
        }
        assert!(dispatches(&mut rx).is_empty());
        assert!(sched.job_state("off").unwrap().last_start.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn time_of_day_dispatch_cycle() {
        let sched = scheduler();
        sched
            .add_job("noon", quick_job, JobOptions::default().at("12:00").unwrap())
            .unwrap();
        let mut rx = sched.bus().subscribe();

        sched.tick_at(at(12, 0, 0)).await;
        assert_eq!(dispatches(&mut rx), vec!["noon"]);

        // Let the worker finish and get reaped.
        time::sleep(Duration::from_millis(50)).await;
        sched.tick_at(at(12, 0, 30)).await;
        assert!(dispatches(&mut rx).is_empty(), "same minute, no re-fire");

        sched.tick_at(at(12, 1, 1)).await;
        assert!(dispatches(&mut rx).is_empty(), "minute no longer matches");

        let next_day = Local.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        sched.tick_at(next_day).await;
        assert_eq!(dispatches(&mut rx), vec!["noon"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_job_is_terminated_and_finish_recorded() {
        let sched = scheduler();
        sched
            .add_job(
                "stuck",
                |_prev| {
                    JobFn::arc(|| async {
                        time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, JobError>(())
                    })
                },
                JobOptions::default()
                    .every(Duration::from_secs(3600))
                    .max_run_time(Duration::from_secs(1)),
            )
            .unwrap();
        let mut rx = sched.bus().subscribe();

        sched.tick_at(at(8, 0, 0)).await;
        assert_eq!(sched.work_running("stuck"), 1);

        time::sleep(Duration::from_secs(2)).await;
        sched.tick_at(at(8, 0, 2)).await;

        assert_eq!(sched.work_running("stuck"), 0);
        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .collect();
        assert!(kinds.contains(&EventKind::JobTimedOut));
        assert!(
            sched.job_state("stuck").unwrap().last_finish.is_some(),
            "finish time recorded even for a timed-out run"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_does_not_block_others() {
        let sched = scheduler();
        sched
            .add_job(
                "broken",
                |_prev| JobFn::arc(|| async { Err::<(), _>(JobError::fail("boom")) }),
                JobOptions::default().every(Duration::from_secs(60)),
            )
            .unwrap();
        sched
            .add_job(
                "healthy",
                quick_job,
                JobOptions::default().every(Duration::from_secs(60)),
            )
            .unwrap();
        let mut rx = sched.bus().subscribe();

        sched.tick_at(at(7, 0, 0)).await;
        assert_eq!(dispatches(&mut rx), vec!["broken", "healthy"]);

        // Both workers exit; the failure is reported, not raised.
        time::sleep(Duration::from_millis(50)).await;
        sched.tick_at(at(7, 0, 1)).await;
        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .collect();
        assert!(kinds.contains(&EventKind::JobFailed));
        assert!(kinds.contains(&EventKind::JobCompleted));
        assert!(sched.job_state("broken").unwrap().last_finish.is_some());

        // Next interval: both are evaluated and dispatched again.
        sched.tick_at(at(7, 2, 0)).await;
        assert_eq!(dispatches(&mut rx), vec!["broken", "healthy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn evaluation_follows_registration_order() {
        let sched = scheduler();
        for key in ["c", "a", "b"] {
            sched
                .add_job(key, quick_job, JobOptions::default().every(Duration::ZERO))
                .unwrap();
        }
        let mut rx = sched.bus().subscribe();
        sched.tick_at(at(5, 0, 0)).await;
        assert_eq!(dispatches(&mut rx), vec!["c", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_stops_on_cancellation() {
        let sched = Arc::new(scheduler());
        sched
            .add_job("tick", quick_job, JobOptions::default().every(Duration::ZERO))
            .unwrap();

        let token = CancellationToken::new();
        let handle = {
            let sched = Arc::clone(&sched);
            let token = token.clone();
            tokio::spawn(async move { sched.run(token).await })
        };

        time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();
        assert!(sched.job_state("tick").unwrap().last_start.is_some());
    }
}
