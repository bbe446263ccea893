//! Background job domain entities.

pub mod failure;
pub mod model;
pub mod status;

pub use failure::{FailureKind, JobFailure};
pub use model::{Job, ReclaimOutcome, TransitionError};
pub use status::JobStatus;
