//! Background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Stable worker name used as the prefix of lease tokens.
    /// Defaults to `worker-<8 hex digits>`, random per process, when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in milliseconds between claim scans when idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum number of pending candidates examined per claim scan.
    #[serde(default = "default_claim_batch")]
    pub claim_batch_size: usize,
    /// How long a claim stays valid without renewal, in seconds.
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u64,
    /// Default maximum execution attempts per job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Store retries for finalize/submit before giving up.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
    /// Base delay in milliseconds for exponential store-retry backoff.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Upper bound in milliseconds on a single store-retry delay.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    /// Cron expression (with seconds) for the expired-lease reclaim sweep.
    #[serde(default = "default_reclaim_schedule")]
    pub reclaim_schedule: String,
}

impl WorkerConfig {
    /// Lease duration as a [`Duration`].
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }

    /// Idle poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Configured worker id, or a fresh `worker-<8 hex digits>` name.
    pub fn resolve_worker_id(&self) -> String {
        self.worker_id.clone().unwrap_or_else(|| {
            format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            worker_id: None,
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            claim_batch_size: default_claim_batch(),
            lease_duration_seconds: default_lease_duration(),
            max_attempts: default_max_attempts(),
            store_retries: default_store_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            reclaim_schedule: default_reclaim_schedule(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_claim_batch() -> usize {
    16
}

fn default_lease_duration() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_store_retries() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    100
}

fn default_retry_max_delay() -> u64 {
    5000
}

fn default_reclaim_schedule() -> String {
    "*/15 * * * * *".to_string()
}
