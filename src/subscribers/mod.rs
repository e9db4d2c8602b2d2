//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`]
//! fan-out, and a built-in [`LogWriter`] that bridges runtime events onto
//! the `tracing` facade.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Scheduler / WorkerPool ── publish(Event) ──► Bus
//!                                                 │
//!                               Scheduler::run listener
//!                                                 │
//!                                          SubscriberSet::emit
//!                                    ┌────────────┼────────────┐
//!                                    ▼            ▼            ▼
//!                                LogWriter     Metrics      Custom ...
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
