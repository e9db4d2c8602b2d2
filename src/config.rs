//! # Global scheduler configuration.
//!
//! [`SchedulerConfig`] defines the runtime knobs shared by the scheduler and
//! its worker pool: the polling cadence, event-bus capacity, and the default
//! schedule interval and maximum run time applied to jobs that do not set
//! their own.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use jobrunner::SchedulerConfig;
//!
//! let mut cfg = SchedulerConfig::default();
//! cfg.poll_interval = Duration::from_millis(250);
//! cfg.default_max_run_time = Duration::from_secs(3600);
//!
//! assert_eq!(cfg.poll_interval, Duration::from_millis(250));
//! ```

use std::time::Duration;

/// Global configuration for the scheduler and its worker pool.
///
/// Controls polling cadence, event-bus capacity, and the per-job defaults
/// used when [`JobOptions`](crate::JobOptions) leaves a field unset.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Cadence of the pool's spawn/reap polling. Timed-out workers are
    /// killed and reaped within one such interval of their deadline; it is
    /// also the sleep used by `drain` and the `run` driver loop.
    pub poll_interval: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Default interval between job runs when the job does not set one.
    pub default_interval: Duration,
    /// Default maximum run time before a worker is forcibly terminated.
    pub default_max_run_time: Duration,
}

impl Default for SchedulerConfig {
    /// Provides a default configuration:
    /// - `poll_interval = 1s`
    /// - `bus_capacity = 1024`
    /// - `default_interval = 6h`
    /// - `default_max_run_time = 48h`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            bus_capacity: 1024,
            default_interval: Duration::from_secs(21_600),
            default_max_run_time: Duration::from_secs(172_800),
        }
    }
}
