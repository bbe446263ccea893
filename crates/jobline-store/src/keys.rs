//! Key builders for job records and their status indexes.
//!
//! Keys are relative; the Redis client adds the configured prefix.

use jobline_core::types::JobId;
use jobline_entity::JobStatus;

/// Key holding the serialized record of a job.
pub fn job_record(job_id: JobId) -> String {
    format!("job:{job_id}")
}

/// Key of the set indexing all job ids currently in `status`.
pub fn status_index(status: JobStatus) -> String {
    format!("jobs:status:{}", status.as_str())
}

/// Keys touched when a job record moves from one status to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionKeys {
    /// Record key.
    pub record: String,
    /// Index the id leaves.
    pub from_index: String,
    /// Index the id joins.
    pub to_index: String,
}

impl TransitionKeys {
    /// Whether the id changes index sets.
    pub fn moves_index(&self) -> bool {
        self.from_index != self.to_index
    }

    /// Apply `f` (typically the store's key prefix) to every key.
    pub fn map(self, f: impl Fn(&str) -> String) -> Self {
        Self {
            record: f(&self.record),
            from_index: f(&self.from_index),
            to_index: f(&self.to_index),
        }
    }
}

/// Keys for writing `job_id` from status `from` to status `to`.
///
/// Creation uses `from == to`: the record lands in its initial index.
pub fn transition(job_id: JobId, from: JobStatus, to: JobStatus) -> TransitionKeys {
    TransitionKeys {
        record: job_record(job_id),
        from_index: status_index(from),
        to_index: status_index(to),
    }
}
