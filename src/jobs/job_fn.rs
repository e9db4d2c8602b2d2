//! # Function-backed job (`JobFn`)
//!
//! [`JobFn`] wraps a closure `F: Fn() -> Fut`, producing a fresh future per
//! run. This avoids shared mutable state; if shared state is needed, move an
//! `Arc<...>` into the closure explicitly.
//!
//! ## Example
//! ```rust
//! use jobrunner::{JobError, JobFn, JobRef};
//!
//! let j: JobRef = JobFn::arc(|| async {
//!     // do work...
//!     Ok::<_, JobError>(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;
use crate::jobs::job::Job;

/// Function-backed job implementation.
///
/// Wraps a closure that *creates* a new future per run.
#[derive(Debug)]
pub struct JobFn<F> {
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    ///
    /// Prefer [`JobFn::arc`] when you immediately need a [`JobRef`](crate::JobRef).
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the job and returns it as a shared handle (`Arc<dyn Job>`).
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn start(&self) -> Result<(), JobError> {
        (self.f)().await
    }
}
