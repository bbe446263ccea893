//! Job entity model and its state-machine operations.
//!
//! Every mutation a worker or sweep performs is expressed as a method on
//! [`Job`] so that stores can apply it under their conditional-update
//! guarantee and then check [`Job::check_invariants`] before writing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobline_core::error::AppError;
use jobline_core::types::JobId;

use super::failure::{FailureKind, JobFailure};
use super::status::JobStatus;

/// A background job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Handler dispatch key (e.g. `"echo"`, `"document_ingest"`).
    pub job_type: String,
    /// Current job status.
    pub status: JobStatus,
    /// Opaque input supplied at creation.
    pub payload: serde_json::Value,
    /// Result data, present only when `COMPLETED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure descriptor, present only when `FAILED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Number of execution attempts started.
    pub attempts: u32,
    /// Maximum allowed attempts.
    pub max_attempts: u32,
    /// Lease token of the worker currently holding the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_owner: Option<String>,
    /// When the current lease lapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Lease token whose holder settled the most recent attempt.
    ///
    /// Lets a holder whose finalize was applied but not acknowledged
    /// recognize its own write. Cleared when the sweep settles an attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A rejected state-machine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The status edge is not part of the job lifecycle.
    #[error("illegal transition {from} -> {to}")]
    Illegal {
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },
    /// The caller's lease token does not match the record.
    #[error("lease is not held by '{owner}'")]
    LeaseNotHeld {
        /// Token presented by the caller.
        owner: String,
    },
    /// A reclaim was attempted before the lease lapsed.
    #[error("lease is active until {expires_at}")]
    LeaseActive {
        /// Current lease expiry.
        expires_at: DateTime<Utc>,
    },
    /// The record would break a data-model invariant.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::conflict(err.to_string())
    }
}

/// What a reclaim sweep did with an expired job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Returned to `PENDING` for another attempt.
    Requeued,
    /// No attempts remained; moved to `FAILED`.
    Failed,
}

impl Job {
    /// Create a new `PENDING` job with a fresh identifier.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            lease_owner: None,
            lease_expires_at: None,
            settled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether every allowed attempt has been started.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Whether the job is `PROCESSING` under a lease that has lapsed.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.lease_expires_at.is_none_or(|expires| expires <= now)
    }

    /// Whether `owner` holds a live lease on this job.
    pub fn holds_lease(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.lease_owner.as_deref() == Some(owner)
            && !self.lease_expired(now)
    }

    /// `PENDING -> PROCESSING`: take a lease and start a new attempt.
    pub fn claim(
        &mut self,
        owner: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let expires_at = lease_deadline(now, lease)?;
        self.transition(JobStatus::Processing, now)?;
        self.lease_owner = Some(owner.to_string());
        self.lease_expires_at = Some(expires_at);
        self.attempts += 1;
        Ok(())
    }

    /// Push the lease deadline out to `now + lease`.
    pub fn renew_lease(
        &mut self,
        owner: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_owner(owner)?;
        self.lease_expires_at = Some(lease_deadline(now, lease)?);
        self.updated_at = now;
        Ok(())
    }

    /// `PROCESSING -> COMPLETED` with the handler's result.
    pub fn complete(
        &mut self,
        owner: &str,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_owner(owner)?;
        self.transition(JobStatus::Completed, now)?;
        self.result = Some(result);
        self.settle(owner);
        Ok(())
    }

    /// `PROCESSING -> FAILED` with a failure descriptor.
    pub fn fail(
        &mut self,
        owner: &str,
        failure: JobFailure,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_owner(owner)?;
        self.transition(JobStatus::Failed, now)?;
        self.error = Some(failure);
        self.settle(owner);
        Ok(())
    }

    /// `PROCESSING -> PENDING` after a failed attempt that may be retried.
    pub fn release_for_retry(
        &mut self,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_owner(owner)?;
        self.transition(JobStatus::Pending, now)?;
        self.settle(owner);
        Ok(())
    }

    /// Recover a job whose worker stopped renewing its lease.
    ///
    /// Requeues the job, or fails it with [`FailureKind::LeaseExpired`] when
    /// no attempts remain.
    pub fn reclaim_expired(&mut self, now: DateTime<Utc>) -> Result<ReclaimOutcome, TransitionError> {
        if self.status != JobStatus::Processing {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: JobStatus::Pending,
            });
        }
        if !self.lease_expired(now) {
            return Err(TransitionError::LeaseActive {
                expires_at: self.lease_expires_at.unwrap_or(now),
            });
        }

        let previous_owner = self.lease_owner.clone().unwrap_or_default();
        if self.attempts_exhausted() {
            self.transition(JobStatus::Failed, now)?;
            self.error = Some(JobFailure::new(
                FailureKind::LeaseExpired,
                format!(
                    "lease held by '{previous_owner}' expired on attempt {}/{}",
                    self.attempts, self.max_attempts
                ),
            ));
            self.clear_lease();
            self.settled_by = None;
            Ok(ReclaimOutcome::Failed)
        } else {
            self.transition(JobStatus::Pending, now)?;
            self.clear_lease();
            self.settled_by = None;
            Ok(ReclaimOutcome::Requeued)
        }
    }

    /// Verify the record-level invariants of the data model.
    pub fn check_invariants(&self) -> Result<(), TransitionError> {
        match self.status {
            JobStatus::Completed if self.result.is_none() => {
                return Err(TransitionError::Invariant("completed job without result"));
            }
            JobStatus::Failed if self.error.is_none() => {
                return Err(TransitionError::Invariant("failed job without error"));
            }
            _ => {}
        }
        if self.status != JobStatus::Completed && self.result.is_some() {
            return Err(TransitionError::Invariant("result on non-completed job"));
        }
        if self.status != JobStatus::Failed && self.error.is_some() {
            return Err(TransitionError::Invariant("error on non-failed job"));
        }
        let leased = self.lease_owner.is_some() || self.lease_expires_at.is_some();
        if (self.status == JobStatus::Processing) != leased {
            return Err(TransitionError::Invariant(
                "lease must be present exactly while processing",
            ));
        }
        if self.updated_at < self.created_at {
            return Err(TransitionError::Invariant("updated_at precedes created_at"));
        }
        Ok(())
    }

    fn ensure_owner(&self, owner: &str) -> Result<(), TransitionError> {
        if self.status == JobStatus::Processing && self.lease_owner.as_deref() == Some(owner) {
            Ok(())
        } else {
            Err(TransitionError::LeaseNotHeld {
                owner: owner.to_string(),
            })
        }
    }

    fn transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now.max(self.updated_at);
        Ok(())
    }

    /// Whether the attempt leased under `owner` has been settled by its holder.
    pub fn was_settled_by(&self, owner: &str) -> bool {
        self.settled_by.as_deref() == Some(owner)
    }

    fn settle(&mut self, owner: &str) {
        self.clear_lease();
        self.settled_by = Some(owner.to_string());
    }

    fn clear_lease(&mut self) {
        self.lease_owner = None;
        self.lease_expires_at = None;
    }
}

fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> Result<DateTime<Utc>, TransitionError> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(TransitionError::Invariant("lease duration out of range"))
}
