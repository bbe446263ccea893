//! Job store trait for pluggable persistence backends.

use async_trait::async_trait;

use jobline_core::error::AppError;
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::{Job, JobStatus};

/// A mutation applied to a job record under a conditional update.
///
/// It must be a pure function of the record: backends that use optimistic
/// concurrency may invoke it more than once.
pub type JobMutation<'a> = &'a (dyn Fn(&mut Job) -> AppResult<()> + Send + Sync);

/// Trait for durable job record stores.
///
/// All writers go through [`JobStore::update`]; there is no unconditional
/// overwrite.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new record. Fails with `DuplicateId` if the id exists.
    async fn create(&self, job: &Job) -> AppResult<()>;

    /// Fetch a record by id. Returns `None` if it does not exist.
    async fn get(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Atomically apply `mutation` if the record's status equals `expected`.
    ///
    /// Returns the updated record. Fails with `NotFound` if the record is
    /// missing and with `Conflict` (no side effect) if the precondition does
    /// not hold or the mutation is not a legal transition.
    async fn update(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: JobMutation<'_>,
    ) -> AppResult<Job>;

    /// List up to `limit` job ids currently in `status`.
    async fn list_by_status(&self, status: JobStatus, limit: usize) -> AppResult<Vec<JobId>>;

    /// Count jobs currently in `status`.
    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64>;

    /// Check that the store backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Evaluate a conditional update against `current` without writing it.
///
/// Shared by every backend so precondition and state-machine checks are
/// identical regardless of where records live.
pub fn apply_mutation(current: &Job, expected: JobStatus, mutation: JobMutation<'_>) -> AppResult<Job> {
    if current.status != expected {
        return Err(AppError::conflict(format!(
            "Job {} is {} (expected {})",
            current.id, current.status, expected
        )));
    }

    let mut next = current.clone();
    mutation(&mut next)?;

    if next.id != current.id
        || next.job_type != current.job_type
        || next.payload != current.payload
        || next.created_at != current.created_at
    {
        return Err(AppError::conflict(format!(
            "Mutation of job {} touched an immutable field",
            current.id
        )));
    }

    if next.status != current.status && !current.status.can_transition_to(next.status) {
        return Err(AppError::conflict(format!(
            "Illegal transition for job {}: {} -> {}",
            current.id, current.status, next.status
        )));
    }

    next.check_invariants()?;
    Ok(next)
}
