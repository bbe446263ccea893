//! # jobline-service
//!
//! Service layer for Jobline. The status reader answers "what state is this
//! job in", optionally waiting a bounded time for it to finish.
//!
//! Services follow constructor injection: all dependencies are provided at
//! construction time via `Arc` references.

pub mod status;

pub use status::JobStatusReader;
