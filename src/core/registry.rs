//! # Job registry: ordered definitions and run-time bookkeeping.
//!
//! The registry owns one [`JobDefinition`] per key: the factory, the
//! scheduling options, and the two timestamps the scheduler maintains
//! (`last_start`, `last_finish`). Definitions are created once at startup
//! registration and live for the process lifetime; nothing is persisted.
//!
//! ## Rules
//! - Iteration order is **registration order** (stable, deterministic).
//! - Re-registering a key with **equal** options is a no-op; the existing
//!   definition and its timestamps are left untouched.
//! - Re-registering with **different** options is a conflict
//!   (`SchedulerError::DuplicateJob`) and changes nothing.
//! - `last_start` is written only by the scheduler at dispatch;
//!   `last_finish` only by the pool's exit path. The two never race for
//!   one key because a key has at most one outstanding worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::jobs::{JobOptions, JobRef, DEFAULT_INTERVAL};

/// Builds a fresh job instance for one run, given the previous finish
/// timestamp (`None` on the first run).
pub type JobFactory = Arc<dyn Fn(Option<DateTime<Local>>) -> JobRef + Send + Sync>;

/// One registered job: factory, options, and run-time timestamps.
struct JobDefinition {
    factory: JobFactory,
    options: JobOptions,
    last_start: Option<DateTime<Local>>,
    last_finish: Option<DateTime<Local>>,
}

/// Cloneable view of a definition's schedulable state.
#[derive(Clone, Debug)]
pub struct JobState {
    /// The options fixed at registration.
    pub options: JobOptions,
    /// When the job was last dispatched (set synchronously at dispatch).
    pub last_start: Option<DateTime<Local>>,
    /// When the job's worker last exited (any exit status except a refused
    /// spawn).
    pub last_finish: Option<DateTime<Local>>,
}

struct Inner {
    jobs: HashMap<String, JobDefinition>,
    order: Vec<String>,
}

/// Registry of job definitions, keyed by stable job keys.
pub struct JobRegistry {
    inner: RwLock<Inner>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                jobs: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Registers a job under `key`.
    ///
    /// Idempotent-safe: an identical re-registration is a no-op so repeated
    /// setup calls are tolerated; a re-registration with different options
    /// fails with [`SchedulerError::DuplicateJob`] and leaves the existing
    /// definition unchanged.
    pub fn register(
        &self,
        key: &str,
        factory: JobFactory,
        options: JobOptions,
    ) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(existing) = inner.jobs.get(key) {
            if existing.options == options {
                return Ok(());
            }
            return Err(SchedulerError::DuplicateJob {
                key: key.to_string(),
            });
        }

        if options.run_at.is_some() && options.interval != DEFAULT_INTERVAL {
            warn!(
                job = key,
                "both run-at and interval configured; run-at takes priority"
            );
        }
        info!(job = key, options = ?options, "job registered");

        inner.order.push(key.to_string());
        inner.jobs.insert(
            key.to_string(),
            JobDefinition {
                factory,
                options,
                last_start: None,
                last_finish: None,
            },
        );
        Ok(())
    }

    /// Job keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().expect("registry lock poisoned").order.clone()
    }

    /// True if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .jobs
            .contains_key(key)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").jobs.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a job's options and timestamps.
    pub fn state(&self, key: &str) -> Result<JobState, SchedulerError> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .jobs
            .get(key)
            .map(|def| JobState {
                options: def.options.clone(),
                last_start: def.last_start,
                last_finish: def.last_finish,
            })
            .ok_or_else(|| SchedulerError::UnknownJob {
                key: key.to_string(),
            })
    }

    /// Records the dispatch time. Called by the scheduler synchronously,
    /// before the worker spawns, so a concurrent re-evaluation can never
    /// double-dispatch the key.
    pub fn mark_started(&self, key: &str, at: DateTime<Local>) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.jobs.get_mut(key) {
            Some(def) => {
                def.last_start = Some(at);
                Ok(())
            }
            None => Err(SchedulerError::UnknownJob {
                key: key.to_string(),
            }),
        }
    }

    /// Records the worker exit time; fired from the pool's exit callback
    /// for every exit status except a refused spawn.
    pub fn mark_finished(&self, key: &str, at: DateTime<Local>) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.jobs.get_mut(key) {
            Some(def) => {
                def.last_finish = Some(at);
                Ok(())
            }
            None => Err(SchedulerError::UnknownJob {
                key: key.to_string(),
            }),
        }
    }

    /// Builds a fresh job instance via the registered factory, handing it
    /// the previous finish timestamp. The factory runs with the registry
    /// lock released.
    pub fn instantiate(&self, key: &str) -> Result<JobRef, SchedulerError> {
        let (factory, last_finish) = {
            let inner = self.inner.read().expect("registry lock poisoned");
            let def = inner
                .jobs
                .get(key)
                .ok_or_else(|| SchedulerError::UnknownJob {
                    key: key.to_string(),
                })?;
            (Arc::clone(&def.factory), def.last_finish)
        };
        Ok(factory(last_finish))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::jobs::JobFn;
    use std::time::Duration;

    fn noop_factory() -> JobFactory {
        Arc::new(|_prev| JobFn::arc(|| async { Ok::<_, JobError>(()) }))
    }

    #[test]
    fn keys_preserve_registration_order() {
        let reg = JobRegistry::new();
        for key in ["zeta", "alpha", "mid"] {
            reg.register(key, noop_factory(), JobOptions::default())
                .unwrap();
        }
        assert_eq!(reg.keys(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn identical_reregistration_is_a_noop() {
        let reg = JobRegistry::new();
        let opts = JobOptions::default().every(Duration::from_secs(60));
        reg.register("a", noop_factory(), opts.clone()).unwrap();
        let started = Local::now();
        reg.mark_started("a", started).unwrap();

        reg.register("a", noop_factory(), opts.clone()).unwrap();

        let state = reg.state("a").unwrap();
        assert_eq!(state.options, opts, "options unchanged");
        assert_eq!(state.last_start, Some(started), "timestamps unchanged");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn conflicting_reregistration_is_rejected() {
        let reg = JobRegistry::new();
        reg.register("a", noop_factory(), JobOptions::default())
            .unwrap();
        let err = reg
            .register(
                "a",
                noop_factory(),
                JobOptions::default().every(Duration::from_secs(1)),
            )
            .unwrap_err();
        assert_eq!(err.as_label(), "duplicate_job");
        assert_eq!(reg.state("a").unwrap().options, JobOptions::default());
    }

    #[test]
    fn unknown_key_is_reported() {
        let reg = JobRegistry::new();
        assert_eq!(reg.state("ghost").unwrap_err().as_label(), "unknown_job");
        assert_eq!(
            reg.mark_started("ghost", Local::now()).unwrap_err().as_label(),
            "unknown_job"
        );
        assert!(reg.instantiate("ghost").is_err());
    }

    #[test]
    fn factory_receives_previous_finish_time() {
        let reg = JobRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let factory: JobFactory = Arc::new(move |prev| {
            sink.lock().unwrap().push(prev);
            JobFn::arc(|| async { Ok::<_, JobError>(()) })
        });
        reg.register("a", factory, JobOptions::default()).unwrap();

        reg.instantiate("a").unwrap();
        let finished = Local::now();
        reg.mark_finished("a", finished).unwrap();
        reg.instantiate("a").unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), &[None, Some(finished)]);
    }
}
