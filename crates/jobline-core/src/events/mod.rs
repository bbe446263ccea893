//! In-process job lifecycle events.
//!
//! Events let idle workers and waiting pollers react immediately to
//! submissions and finalizations in the same process. They carry no state;
//! the job store stays the only source of truth, and every consumer
//! re-reads the record after being woken.

pub mod job;

pub use job::{JobEvent, JobEventBus};
