//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the scheduler and by
//! worker pools (including nested pools opened by forking jobs).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Scheduler` (dispatch), `WorkerPool` (spawn/reap).
//! - **Consumers**: the subscriber listener spawned by `Scheduler::run`,
//!   which fans out to `SubscriberSet`, and any direct `Bus::subscribe`
//!   receiver (tests use this).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
