//! # jobrunner
//!
//! **Jobrunner** is a recurring-job scheduling library for Rust.
//!
//! It provides primitives to register jobs with per-job schedules, dispatch
//! them into isolated workers with bounded concurrency and hard run-time
//! limits, and fan out lifecycle events to subscribers. The crate is
//! designed as a building block for long-running daemons.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  JobOptions  │   │  JobOptions  │   │  JobOptions  │
//!     │ (user job A) │   │ (user job B) │   │ (user job C) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (tick loop)                                            │
//! │  - JobRegistry (factories, options, run timestamps)               │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - WorkerPool<String> (one bucket per job, concurrency 1)         │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ bucket "A"   │   │ bucket "B"   │   │ bucket "C"   │
//!     │ worker (0/1) │   │ worker (0/1) │   │ worker (0/1) │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ Publishes        │ Publishes        │ Publishes
//!      │ - JobDispatched  │ - JobCompleted   │ - JobTimedOut
//!      │ - WorkerSpawned  │ - JobFailed      │ - ...
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: SchedulerConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │    (in Scheduler)      │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                        ┌─────────┼─────────┐
//!                        ▼         ▼         ▼
//!                        worker1  worker2  workerN
//!                        ▼         ▼         ▼
//!                   sub1.on   sub2.on   subN.on
//!                    _event()  _event()  _event()
//! ```
//!
//! ### Tick lifecycle
//! ```text
//! add_job(key, factory, options) ──► JobRegistry + bucket(key, 1)
//!
//! every poll_interval {
//!   for key in registration order {
//!     ├─ disabled                      ─► skip
//!     ├─ worker active for key         ─► skip (one outstanding run max)
//!     ├─ schedule not due              ─► skip
//!     └─ due:
//!          ├─ last_start = now
//!          ├─ publish JobDispatched
//!          └─ pool.submit(key)
//!   }
//!   pool.tick():
//!     ├─ reap finished workers         ─► JobCompleted / JobFailed
//!     ├─ kill + reap expired workers   ─► JobTimedOut (hard abort)
//!     └─ spawn queued payloads         ─► WorkerSpawned
//! }
//!
//! Schedules:
//!   - Every(interval): due when elapsed since last dispatch > interval
//!   - At("HH:MM"):     due once per calendar day, in the matching minute
//! ```
//!
//! Jobs that shard a batch across parallel sub-workers wrap a [`ForkWork`]
//! implementation in a [`ForkingJob`], which runs its own nested
//! [`WorkerPool`] and drains it before the job reports done.
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                        |
//! |-------------------|-------------------------------------------------------------------|-------------------------------------------|
//! | **Scheduling**    | Register jobs with intervals or daily times; at most one run each.| [`Scheduler`], [`JobOptions`], [`RunAt`]  |
//! | **Jobs**          | Define jobs as trait impls or plain async closures.               | [`Job`], [`JobFn`], [`JobRef`]            |
//! | **Worker pools**  | Bounded buckets of isolated workers with hard time limits.        | [`WorkerPool`], [`ExitStatus`]            |
//! | **Forking**       | Shard batch work across parallel sub-workers inside one job.      | [`ForkWork`], [`ForkingJob`], [`WorkSink`]|
//! | **Subscriber API**| Hook into job lifecycle events (logging, metrics, custom sinks).  | [`Subscribe`], [`LogWriter`]              |
//! | **Errors**        | Typed errors for registration, pools, and job execution.          | [`SchedulerError`], [`PoolError`], [`JobError`] |
//! | **Configuration** | Centralize runtime settings and per-job defaults.                 | [`SchedulerConfig`]                       |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use jobrunner::{
//!     JobError, JobFn, JobOptions, LogWriter, Scheduler, SchedulerConfig, Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SchedulerConfig::default();
//!     cfg.poll_interval = Duration::from_millis(500);
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
//!     let sched = Scheduler::new(cfg).with_subscribers(subs);
//!
//!     // Runs every five minutes, killed if it exceeds one minute.
//!     sched.add_job(
//!         "heartbeat",
//!         |_prev| {
//!             JobFn::arc(|| async {
//!                 println!("still alive");
//!                 Ok::<_, JobError>(())
//!             })
//!         },
//!         JobOptions::default()
//!             .every(Duration::from_secs(300))
//!             .max_run_time(Duration::from_secs(60)),
//!     )?;
//!
//!     let token = CancellationToken::new();
//!     token.cancel(); // stop immediately; a daemon would cancel on shutdown
//!     sched.run(token).await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod jobs;
mod pool;
mod subscribers;

// ---- Public re-exports ----

pub use config::SchedulerConfig;
pub use core::{JobFactory, JobRegistry, JobState, Scheduler};
pub use error::{JobError, PoolError, SchedulerError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{
    ForkConfig, ForkWork, ForkingJob, Job, JobFn, JobOptions, JobRef, RunAt, Schedule, WorkSink,
    DEFAULT_INTERVAL, DEFAULT_MAX_RUN_TIME,
};
pub use pool::{ExitStatus, WorkerExit, WorkerId, WorkerPool};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
