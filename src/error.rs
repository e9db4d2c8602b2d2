//! Error types used by the scheduler, the worker pool, and jobs.
//!
//! Three enums cover the three failure domains:
//!
//! - [`SchedulerError`] — configuration/registration errors; the only errors
//!   ever returned to a caller. Rejected synchronously at the registration
//!   call site, never admitted into the registry.
//! - [`PoolError`] — misuse of the worker-pool API (unknown bucket).
//! - [`JobError`] — failures of individual job executions, carried inside
//!   [`ExitStatus::Failed`](crate::pool::ExitStatus) and never propagated
//!   past the worker boundary.
//!
//! All types provide `as_label()` for stable snake_case log/metric fields.

use thiserror::Error;

/// # Errors raised at registration and lookup call sites.
///
/// These are the only errors a caller of the scheduler API ever sees.
/// Nothing at runtime (job failures, timeouts, spawn failures) aborts the
/// scheduler; those are reported through the pool's exit callback instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A job key was re-registered with options that differ from the
    /// existing definition. Re-registering with *equal* options is a no-op,
    /// not an error.
    #[error("job '{key}' is already registered with different options")]
    DuplicateJob {
        /// The conflicting job key.
        key: String,
    },

    /// No job is registered under the given key.
    #[error("unknown job '{key}'")]
    UnknownJob {
        /// The missing job key.
        key: String,
    },

    /// A time-of-day schedule string could not be parsed as `"HH:MM"`.
    #[error("invalid run-at time '{value}', expected \"HH:MM\"")]
    InvalidRunAt {
        /// The rejected input.
        value: String,
    },
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::DuplicateJob { .. } => "duplicate_job",
            SchedulerError::UnknownJob { .. } => "unknown_job",
            SchedulerError::InvalidRunAt { .. } => "invalid_run_at",
        }
    }
}

/// # Errors raised by the worker-pool API.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PoolError {
    /// `submit`/`drain` was called for a bucket that was never added.
    #[error("unknown bucket '{bucket}'")]
    UnknownBucket {
        /// The missing bucket key.
        bucket: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::UnknownBucket { .. } => "unknown_bucket",
        }
    }
}

/// # Errors produced by job execution.
///
/// Raised by [`Job::start`](crate::Job::start) or
/// [`ForkWork::process_work`](crate::ForkWork::process_work), caught at the
/// worker boundary, logged, and surfaced to the owning pool as a `Failed`
/// exit status. They never reach the scheduler as a `Result`.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Job code returned an error.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The worker task panicked; the panic was contained at the task
    /// boundary and converted into this error.
    #[error("worker panicked: {error}")]
    Panicked {
        /// Best-effort panic payload description.
        error: String,
    },
}

impl JobError {
    /// Builds a [`JobError::Fail`] from any displayable error.
    ///
    /// # Example
    /// ```
    /// use jobrunner::JobError;
    ///
    /// let err = JobError::fail("connection refused");
    /// assert_eq!(err.as_label(), "job_failed");
    /// ```
    pub fn fail(error: impl std::fmt::Display) -> Self {
        JobError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Panicked { .. } => "job_panicked",
        }
    }

    /// True if this error came from a contained panic rather than an
    /// ordinary `Err` return.
    pub fn is_panic(&self) -> bool {
        matches!(self, JobError::Panicked { .. })
    }
}
