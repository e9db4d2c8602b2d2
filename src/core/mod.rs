//! Runtime core: registry, dispatch, and the tick loop.
//!
//! The public API from this module is [`Scheduler`] plus the registry
//! surface it exposes ([`JobRegistry`], [`JobState`], [`JobFactory`]).
//!
//! Internal modules:
//! - [`registry`]: job definitions, factories, and run timestamps;
//! - [`context`]: the pool entry point that resolves a key into a job run;
//! - [`scheduler`]: eligibility evaluation and the driver loop.

mod context;
mod registry;
mod scheduler;

pub use registry::{JobFactory, JobRegistry, JobState};
pub use scheduler::Scheduler;
