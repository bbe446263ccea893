//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobline_entity::{Job, JobFailure, JobStatus};
use jobline_worker::QueueStats;

/// Job record as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    /// Job ID.
    pub id: String,
    /// Handler dispatch key.
    pub job_type: String,
    /// Current status.
    pub status: JobStatus,
    /// Payload supplied at submission.
    pub payload: serde_json::Value,
    /// Result, when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure descriptor, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Attempts started so far.
    pub attempts: u32,
    /// Attempts allowed.
    pub max_attempts: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type,
            status: job.status,
            payload: job.payload,
            result: job.result,
            error: job.error,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    /// Pending jobs.
    pub pending: u64,
    /// Jobs under a lease.
    pub processing: u64,
    /// Completed jobs.
    pub completed: u64,
    /// Failed jobs.
    pub failed: u64,
    /// All jobs.
    pub total: u64,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(stats: QueueStats) -> Self {
        Self {
            total: stats.pending + stats.processing + stats.completed + stats.failed,
            pending: stats.pending,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `unavailable`.
    pub status: String,
    /// Job store reachability.
    pub store: String,
    /// Server version.
    pub version: String,
}
