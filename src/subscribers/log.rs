//! # Logging subscriber.
//!
//! [`LogWriter`] forwards runtime events to the `tracing` facade with a
//! level matching each event kind: dispatch and spawn at `debug`,
//! completion at `info`, failures and timeouts at `warn`/`error`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use jobrunner::{LogWriter, Subscribe};
//!
//! let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Built-in subscriber that writes every event to the `tracing` facade.
#[derive(Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let bucket = e.bucket.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::JobDispatched => {
                debug!(job = bucket, seq = e.seq, "job dispatched");
            }
            EventKind::WorkerSpawned => {
                debug!(bucket, worker = e.worker, seq = e.seq, "worker spawned");
            }
            EventKind::JobCompleted => {
                info!(bucket, worker = e.worker, seq = e.seq, "job completed");
            }
            EventKind::JobFailed => {
                warn!(
                    bucket,
                    worker = e.worker,
                    error = e.error.as_deref(),
                    seq = e.seq,
                    "job failed"
                );
            }
            EventKind::JobTimedOut => {
                warn!(
                    bucket,
                    worker = e.worker,
                    timeout = ?e.timeout,
                    seq = e.seq,
                    "job exceeded max run time, terminated"
                );
            }
            EventKind::SpawnFailed => {
                error!(
                    bucket,
                    error = e.error.as_deref(),
                    seq = e.seq,
                    "worker spawn failed, payload dropped"
                );
            }
            EventKind::BucketDrained => {
                debug!(bucket, seq = e.seq, "bucket drained");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
