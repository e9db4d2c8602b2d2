//! # Job scheduling options.
//!
//! Defines [`JobOptions`], the configuration bundle attached to a job at
//! registration (enabled flag, interval, optional time-of-day, max run
//! time), plus [`RunAt`] (a wall-clock `"HH:MM"` target) and [`Schedule`],
//! the resolved view of which rule is authoritative.
//!
//! ## Precedence
//! If both a time-of-day and an interval are configured, the time-of-day
//! wins: the interval is kept on the options but never consulted. The
//! scheduler logs a warning at registration when both are present.
//!
//! ## Rules
//! - Options are compared with `==` to decide whether a re-registration is
//!   an idempotent no-op (equal) or a conflict (different).

use std::time::Duration;

use chrono::{DateTime, Local, Timelike};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// Default interval between runs (6 hours).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(21_600);

/// Default maximum run time before forced termination (2 days).
pub const DEFAULT_MAX_RUN_TIME: Duration = Duration::from_secs(172_800);

/// A daily wall-clock firing target, minute resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunAt {
    /// Hour of day, 0..=23.
    pub hour: u32,
    /// Minute of hour, 0..=59.
    pub minute: u32,
}

impl RunAt {
    /// Parses a `"HH:MM"` string (also accepts `"H:MM"`).
    ///
    /// # Example
    /// ```
    /// use jobrunner::RunAt;
    ///
    /// let at = RunAt::parse("14:00").unwrap();
    /// assert_eq!((at.hour, at.minute), (14, 0));
    /// assert!(RunAt::parse("25:00").is_err());
    /// assert!(RunAt::parse("noon").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, SchedulerError> {
        let invalid = || SchedulerError::InvalidRunAt {
            value: value.to_string(),
        };
        let (h, m) = value.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.trim().parse().map_err(|_| invalid())?;
        let minute: u32 = m.trim().parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }

    /// True if `now` falls inside this target's calendar minute.
    pub fn matches(&self, now: &DateTime<Local>) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }
}

/// The authoritative schedule rule for a job, after precedence resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Fire when the elapsed time since the last dispatch exceeds the
    /// interval (always due on the first evaluation).
    Every(Duration),
    /// Fire once per calendar day, in the minute matching the target.
    At(RunAt),
}

/// Per-job scheduling options, fixed at registration.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use jobrunner::JobOptions;
///
/// let opts = JobOptions::default()
///     .every(Duration::from_secs(300))
///     .max_run_time(Duration::from_secs(60));
/// assert!(opts.enabled);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobOptions {
    /// Whether the job may be dispatched at all.
    pub enabled: bool,
    /// Interval between runs; inert when `run_at` is set.
    pub interval: Duration,
    /// Optional daily wall-clock target; takes priority over `interval`.
    pub run_at: Option<RunAt>,
    /// Maximum run time before the worker is forcibly terminated.
    pub max_run_time: Duration,
}

impl Default for JobOptions {
    /// Enabled, every 6 hours, no time-of-day, 2-day max run time.
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            run_at: None,
            max_run_time: DEFAULT_MAX_RUN_TIME,
        }
    }
}

impl JobOptions {
    /// Creates options inheriting the defaults of a [`SchedulerConfig`].
    pub fn with_defaults(cfg: &SchedulerConfig) -> Self {
        Self {
            enabled: true,
            interval: cfg.default_interval,
            run_at: None,
            max_run_time: cfg.default_max_run_time,
        }
    }

    /// Sets the run interval.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets a daily `"HH:MM"` firing time.
    ///
    /// Fails with [`SchedulerError::InvalidRunAt`] on malformed input.
    pub fn at(mut self, hhmm: &str) -> Result<Self, SchedulerError> {
        self.run_at = Some(RunAt::parse(hhmm)?);
        Ok(self)
    }

    /// Sets the maximum run time.
    pub fn max_run_time(mut self, max: Duration) -> Self {
        self.max_run_time = max;
        self
    }

    /// Marks the job as disabled; it is never dispatched until re-enabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Resolves the authoritative schedule: time-of-day wins over interval.
    pub fn schedule(&self) -> Schedule {
        match self.run_at {
            Some(at) => Schedule::At(at),
            None => Schedule::Every(self.interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_accepts_valid_times() {
        assert_eq!(RunAt::parse("00:00").unwrap(), RunAt { hour: 0, minute: 0 });
        assert_eq!(
            RunAt::parse("23:59").unwrap(),
            RunAt {
                hour: 23,
                minute: 59
            }
        );
        assert_eq!(RunAt::parse("9:05").unwrap(), RunAt { hour: 9, minute: 5 });
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["24:00", "12:60", "12", "ab:cd", "", "12:00:00", "-1:10"] {
            let err = RunAt::parse(bad).unwrap_err();
            assert_eq!(err.as_label(), "invalid_run_at", "input: {bad}");
        }
    }

    #[test]
    fn matches_compares_minute_resolution() {
        let at = RunAt::parse("12:00").unwrap();
        let noon = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 30).unwrap();
        let later = Local.with_ymd_and_hms(2025, 3, 10, 12, 1, 0).unwrap();
        assert!(at.matches(&noon));
        assert!(!at.matches(&later));
    }

    #[test]
    fn run_at_takes_priority_over_interval() {
        let opts = JobOptions::default()
            .every(Duration::from_secs(60))
            .at("03:30")
            .unwrap();
        assert_eq!(
            opts.schedule(),
            Schedule::At(RunAt {
                hour: 3,
                minute: 30
            })
        );
    }

    #[test]
    fn interval_is_authoritative_without_run_at() {
        let opts = JobOptions::default().every(Duration::from_secs(60));
        assert_eq!(opts.schedule(), Schedule::Every(Duration::from_secs(60)));
    }
}
