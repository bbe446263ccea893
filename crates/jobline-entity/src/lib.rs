//! # jobline-entity
//!
//! Domain entity models for Jobline: the job record, its status state
//! machine, and the structured failure descriptor.

pub mod job;

pub use job::{FailureKind, Job, JobFailure, JobStatus, ReclaimOutcome, TransitionError};
