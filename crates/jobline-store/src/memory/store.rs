//! In-memory job store using the dashmap crate.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use jobline_core::error::AppError;
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::{Job, JobStatus};

use crate::store::{JobMutation, JobStore, apply_mutation};

/// In-memory job store.
///
/// A conditional update runs while holding the record's shard lock, which
/// makes check-and-write atomic. Suitable for single-node deployments only.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    /// Job records by id.
    jobs: Arc<DashMap<JobId, Job>>,
}

impl MemoryJobStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(AppError::duplicate_id(format!(
                "Job {} already exists",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                debug!(job_id = %job.id, "Created job record");
                Ok(())
            }
        }
    }

    async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: JobMutation<'_>,
    ) -> AppResult<Job> {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        let next = apply_mutation(entry.value(), expected, mutation)?;
        *entry.value_mut() = next.clone();
        Ok(next)
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> AppResult<Vec<JobId>> {
        let mut matching: Vec<(chrono::DateTime<chrono::Utc>, JobId)> = self
            .jobs
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| (entry.updated_at, entry.id))
            .collect();

        // Oldest first, so long-waiting jobs are claimed before fresh ones.
        matching.sort();
        Ok(matching.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        Ok(self.jobs.iter().filter(|entry| entry.status == status).count() as u64)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
