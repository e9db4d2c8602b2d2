//! # Job abstraction.
//!
//! This module defines the [`Job`] trait — the single capability the
//! scheduler requires of anything it runs — and the shared handle type
//! [`JobRef`], an `Arc<dyn Job>` suitable for returning from factories.
//!
//! A job's identity (its key) lives in the registry, not on the job itself:
//! factories are registered under a key and a fresh instance is built for
//! every run, receiving the previous finish timestamp.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::JobError;

/// # A runnable unit of periodic work.
///
/// The scheduler instantiates a job through its registered factory each time
/// it becomes due and calls [`start`](Job::start) inside an isolated worker.
/// Errors returned here are caught at the worker boundary, logged, and
/// reported as a `Failed` exit; they never reach the scheduler as a panic
/// or a `Result`.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use jobrunner::{Job, JobError};
///
/// struct Compact;
///
/// #[async_trait]
/// impl Job for Compact {
///     async fn start(&self) -> Result<(), JobError> {
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Executes one run of the job to completion.
    ///
    /// A run that exceeds the job's configured max run time is forcibly
    /// terminated by the pool; there is no graceful-cancellation signal.
    async fn start(&self) -> Result<(), JobError>;
}

/// Shared handle to a job object.
pub type JobRef = Arc<dyn Job>;
