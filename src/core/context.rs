//! # Worker entry point for scheduler-level buckets.
//!
//! The payload of a scheduler bucket is the job key. Inside the spawned
//! worker this entry resolves the key to its definition, builds a fresh
//! instance through the registered factory (handing it the previous finish
//! timestamp), and calls [`Job::start`](crate::Job::start).
//!
//! ## Rules
//! - This is the error boundary: any failure is logged here and returned
//!   as a `JobError`, which the pool reports as a `Failed` exit. Nothing
//!   raised by job code — error or panic — can reach the scheduler.
//! - An unknown key (a bucket without a registration) is itself a `Failed`
//!   exit, not a crash.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

use crate::core::registry::JobRegistry;
use crate::error::JobError;

/// Builds the entry callback wired into the scheduler's pool.
pub(crate) fn worker_entry(
    registry: Arc<JobRegistry>,
) -> impl Fn(String) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync + 'static {
    move |key: String| {
        let registry = Arc::clone(&registry);
        async move {
            let job = match registry.instantiate(&key) {
                Ok(job) => job,
                Err(e) => {
                    error!(job = %key, error = %e, "cannot instantiate job");
                    return Err(JobError::fail(e));
                }
            };

            debug!(job = %key, "job starting");
            match job.start().await {
                Ok(()) => {
                    debug!(job = %key, "job finished");
                    Ok(())
                }
                Err(e) => {
                    error!(job = %key, error = %e, "job failed");
                    Err(e)
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobFn, JobOptions};

    #[tokio::test]
    async fn unknown_key_becomes_a_failed_result() {
        let registry = Arc::new(JobRegistry::new());
        let entry = worker_entry(registry);
        let err = entry("ghost".to_string()).await.unwrap_err();
        assert_eq!(err.as_label(), "job_failed");
    }

    #[tokio::test]
    async fn job_error_is_returned_not_thrown() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register(
                "bad",
                Arc::new(|_prev| JobFn::arc(|| async { Err::<(), _>(JobError::fail("nope")) })),
                JobOptions::default(),
            )
            .unwrap();

        let entry = worker_entry(registry);
        assert!(entry("bad".to_string()).await.is_err());
    }
}
