//! Structured failure descriptor recorded on `FAILED` jobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a job ended in `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler reported a failure that retrying cannot fix.
    Permanent,
    /// Every allowed attempt failed.
    Exhausted,
    /// The last attempt's worker stopped renewing its lease and no attempts remain.
    LeaseExpired,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Permanent => "permanent",
            Self::Exhausted => "exhausted",
            Self::LeaseExpired => "lease_expired",
        };
        f.write_str(s)
    }
}

/// Failure descriptor stored in [`Job::error`](super::Job::error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable message from the last attempt.
    pub message: String,
}

impl JobFailure {
    /// Create a new failure descriptor.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
