//! # Job abstractions and scheduling options.
//!
//! - [`Job`] — the single capability the scheduler requires;
//!   [`JobRef`] is the shared handle factories return.
//! - [`JobFn`] — closure-backed jobs for simple cases and tests.
//! - [`ForkWork`] / [`ForkingJob`] — jobs that spread internally generated
//!   work across a nested bounded pool.
//! - [`JobOptions`], [`Schedule`], [`RunAt`] — the registration-time
//!   definition of when a job runs and how long it may take.

mod definition;
mod forking;
mod job;
mod job_fn;

pub use definition::{JobOptions, RunAt, Schedule, DEFAULT_INTERVAL, DEFAULT_MAX_RUN_TIME};
pub use forking::{ForkConfig, ForkWork, ForkingJob, WorkSink};
pub use job::{Job, JobRef};
pub use job_fn::JobFn;
