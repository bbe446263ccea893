//! Job queue: the producer and worker-side transitions over the job store.
//!
//! Every write is a conditional update on the store, so any number of queue
//! instances (in one process or many) can operate on the same records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing;
use uuid::Uuid;

use jobline_core::config::worker::WorkerConfig;
use jobline_core::error::{AppError, ErrorKind};
use jobline_core::events::{JobEvent, JobEventBus};
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::{FailureKind, Job, JobFailure, JobStatus};
use jobline_store::JobStore;

use crate::retry::{BackoffPolicy, retry_store_write};

/// Job type used when a submitted payload carries no `task` field.
pub const DEFAULT_JOB_TYPE: &str = "default";

/// Parameters for creating a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreateParams {
    /// Type of job (e.g., "echo", "document_ingest")
    pub job_type: String,
    /// Job payload as JSON
    pub payload: serde_json::Value,
    /// Maximum attempts; the queue default applies when `None`
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl JobCreateParams {
    /// Derive creation parameters from a bare payload.
    ///
    /// The job type is taken from the payload's `task` field.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let job_type = payload
            .get("task")
            .and_then(|task| task.as_str())
            .filter(|task| !task.is_empty())
            .unwrap_or(DEFAULT_JOB_TYPE)
            .to_string();
        Self {
            job_type,
            payload,
            max_attempts: None,
        }
    }
}

/// Result of one reclaim sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Expired `PROCESSING` jobs examined
    pub scanned: usize,
    /// Jobs returned to `PENDING`
    pub requeued: Vec<JobId>,
    /// Jobs moved to `FAILED` because no attempts remained
    pub failed: Vec<JobId>,
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of pending jobs
    pub pending: u64,
    /// Number of processing jobs
    pub processing: u64,
    /// Number of completed jobs
    pub completed: u64,
    /// Number of failed jobs
    pub failed: u64,
    /// Current worker identifier
    pub worker_id: String,
}

/// Job queue for enqueuing, claiming, and finalizing work
#[derive(Debug, Clone)]
pub struct JobQueue {
    /// Shared job record store
    store: Arc<dyn JobStore>,
    /// In-process lifecycle notifications
    events: JobEventBus,
    /// Worker identifier, prefix of every lease token minted here
    worker_id: String,
    /// How long a claim stays valid without renewal
    lease_duration: Duration,
    /// Attempts allowed when the caller does not specify
    default_max_attempts: u32,
    /// Pending candidates examined per claim scan
    claim_batch_size: usize,
    /// Backoff for store-unavailable errors
    backoff: BackoffPolicy,
}

impl JobQueue {
    /// Create a new job queue
    pub fn new(
        store: Arc<dyn JobStore>,
        events: JobEventBus,
        config: &WorkerConfig,
        worker_id: String,
    ) -> Self {
        Self {
            store,
            events,
            worker_id,
            lease_duration: config.lease_duration(),
            default_max_attempts: config.max_attempts.max(1),
            claim_batch_size: config.claim_batch_size.max(1),
            backoff: BackoffPolicy::from_config(config),
        }
    }

    /// Worker identifier of this queue
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Lease duration applied at claim and renewal
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Event bus this queue publishes to
    pub fn events(&self) -> &JobEventBus {
        &self.events
    }

    /// Underlying job store
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Submit a payload as a new job and return its id
    pub async fn submit(&self, payload: serde_json::Value) -> AppResult<JobId> {
        let job = self.enqueue(JobCreateParams::from_payload(payload)).await?;
        Ok(job.id)
    }

    /// Enqueue a new job
    pub async fn enqueue(&self, params: JobCreateParams) -> AppResult<Job> {
        if params.job_type.trim().is_empty() {
            return Err(AppError::validation("Job type must not be empty"));
        }

        let max_attempts = params
            .max_attempts
            .unwrap_or(self.default_max_attempts)
            .max(1);
        let job = Job::new(params.job_type, params.payload, max_attempts, Utc::now());

        let store = &self.store;
        let record = &job;
        let attempt = retry_store_write(&self.backoff, "create", move || store.create(record)).await;
        let interrupted = attempt.was_interrupted();
        if let Err(e) = attempt.result {
            // A create applied before its acknowledgement was lost reads back unchanged.
            let stored = match e.kind {
                ErrorKind::DuplicateId if interrupted => self.store.get(job.id).await.ok().flatten(),
                _ => None,
            };
            if stored.as_ref() != Some(&job) {
                return Err(e);
            }
            tracing::debug!(job_id = %job.id, "Create was applied before the store error");
        }

        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            max_attempts = job.max_attempts,
            "Enqueued job"
        );
        self.events.publish(JobEvent::Submitted(job.id));

        Ok(job)
    }

    /// Mint a lease token unique to one claim.
    pub fn mint_lease_token(&self) -> String {
        format!("{}:{}", self.worker_id, Uuid::new_v4())
    }

    /// Claim the next available pending job.
    ///
    /// Candidates lost to another worker are skipped silently. The returned
    /// job's `lease_owner` is the token to present on renewal and finalize.
    pub async fn claim_next(&self) -> AppResult<Option<Job>> {
        let candidates = self
            .store
            .list_by_status(JobStatus::Pending, self.claim_batch_size)
            .await?;

        for id in candidates {
            let token = self.mint_lease_token();
            let lease = self.lease_duration;
            let claim = |job: &mut Job| {
                job.claim(&token, lease, Utc::now())
                    .map_err(AppError::from)
            };

            match self.store.update(id, JobStatus::Pending, &claim).await {
                Ok(job) => {
                    tracing::debug!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        lease_owner = %token,
                        attempt = job.attempts,
                        "Claimed job"
                    );
                    return Ok(Some(job));
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    tracing::trace!(job_id = %id, "Claim lost to another worker");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Extend the lease held under `token`.
    ///
    /// Fails with `Conflict` once the lease has been lost.
    pub async fn renew_lease(&self, id: JobId, token: &str) -> AppResult<Job> {
        let lease = self.lease_duration;
        let renew = |job: &mut Job| {
            job.renew_lease(token, lease, Utc::now())
                .map_err(AppError::from)
        };
        self.store.update(id, JobStatus::Processing, &renew).await
    }

    /// Mark a job as completed successfully
    pub async fn complete(
        &self,
        id: JobId,
        token: &str,
        result: serde_json::Value,
    ) -> AppResult<Job> {
        let finish = |job: &mut Job| {
            job.complete(token, result.clone(), Utc::now())
                .map_err(AppError::from)
        };
        let job = self.finalize(id, token, "complete", &finish).await?;

        tracing::debug!(job_id = %id, "Job completed");
        Ok(job)
    }

    /// Record a failed attempt.
    ///
    /// Permanent failures end the job at once. Otherwise the job returns to
    /// `PENDING` unless every allowed attempt has been started, in which case
    /// it ends as `FAILED` with kind `exhausted`.
    pub async fn record_failure(
        &self,
        id: JobId,
        token: &str,
        message: &str,
        retryable: bool,
    ) -> AppResult<Job> {
        let settle = |job: &mut Job| {
            let now = Utc::now();
            let outcome = if !retryable {
                job.fail(token, JobFailure::new(FailureKind::Permanent, message), now)
            } else if job.attempts_exhausted() {
                job.fail(token, JobFailure::new(FailureKind::Exhausted, message), now)
            } else {
                job.release_for_retry(token, now)
            };
            outcome.map_err(AppError::from)
        };
        let job = self.finalize(id, token, "record_failure", &settle).await?;

        tracing::debug!(
            job_id = %id,
            status = %job.status,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            error = message,
            "Recorded job failure"
        );
        Ok(job)
    }

    /// Reclaim every `PROCESSING` job whose lease has expired.
    pub async fn reclaim_expired(&self) -> AppResult<ReclaimReport> {
        self.reclaim_expired_at(Utc::now()).await
    }

    /// Reclaim sweep evaluated against `now`.
    pub async fn reclaim_expired_at(&self, now: DateTime<Utc>) -> AppResult<ReclaimReport> {
        let mut report = ReclaimReport::default();
        let candidates = self
            .store
            .list_by_status(JobStatus::Processing, usize::MAX)
            .await?;

        for id in candidates {
            let Some(job) = self.store.get(id).await? else {
                continue;
            };
            if !job.lease_expired(now) {
                continue;
            }
            report.scanned += 1;

            let reclaim = |job: &mut Job| {
                job.reclaim_expired(now)
                    .map(|_| ())
                    .map_err(AppError::from)
            };
            match self.store.update(id, JobStatus::Processing, &reclaim).await {
                Ok(updated) if updated.status == JobStatus::Pending => {
                    tracing::warn!(
                        job_id = %id,
                        previous_owner = job.lease_owner.as_deref().unwrap_or(""),
                        attempt = updated.attempts,
                        "Requeued job with expired lease"
                    );
                    self.events.publish(JobEvent::Requeued(id));
                    report.requeued.push(id);
                }
                Ok(_) => {
                    tracing::warn!(
                        job_id = %id,
                        previous_owner = job.lease_owner.as_deref().unwrap_or(""),
                        "Failed job with expired lease and no attempts left"
                    );
                    self.events.publish(JobEvent::Finalized(id));
                    report.failed.push(id);
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    tracing::trace!(job_id = %id, "Job changed before it could be reclaimed");
                }
                Err(e) => return Err(e),
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                "Reclaim sweep finished"
            );
        }
        Ok(report)
    }

    /// Get queue statistics
    pub async fn stats(&self) -> AppResult<QueueStats> {
        Ok(QueueStats {
            pending: self.store.count_by_status(JobStatus::Pending).await?,
            processing: self.store.count_by_status(JobStatus::Processing).await?,
            completed: self.store.count_by_status(JobStatus::Completed).await?,
            failed: self.store.count_by_status(JobStatus::Failed).await?,
            worker_id: self.worker_id.clone(),
        })
    }

    /// Apply a finalizing mutation with store retries, then announce it.
    ///
    /// After an interrupted try, a `Conflict` on a record already settled
    /// under `token` means that try was applied and only its
    /// acknowledgement was lost.
    async fn finalize(
        &self,
        id: JobId,
        token: &str,
        op_name: &str,
        mutation: &(dyn Fn(&mut Job) -> AppResult<()> + Send + Sync),
    ) -> AppResult<Job> {
        let store = &self.store;
        let attempt = retry_store_write(&self.backoff, op_name, move || {
            store.update(id, JobStatus::Processing, mutation)
        })
        .await;
        let interrupted = attempt.was_interrupted();

        let job = match attempt.result {
            Ok(job) => job,
            Err(e) if e.is_conflict() && interrupted => match self.store.get(id).await {
                Ok(Some(job)) if job.was_settled_by(token) => {
                    tracing::debug!(job_id = %id, operation = op_name, "Finalize was applied before the store error");
                    job
                }
                _ => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let event = if job.is_terminal() {
            JobEvent::Finalized(id)
        } else {
            JobEvent::Requeued(id)
        };
        self.events.publish(event);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use jobline_store::JobMutation;
    use jobline_store::memory::MemoryJobStore;
    use serde_json::json;

    fn make_queue(max_attempts: u32) -> JobQueue {
        let config = WorkerConfig {
            max_attempts,
            ..WorkerConfig::default()
        };
        JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            JobEventBus::new(),
            &config,
            "worker-test".to_string(),
        )
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let queue = make_queue(3);
        let mut events = queue.events().subscribe();

        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();
        let job = queue.store().get(id).await.unwrap().unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, "echo");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert!(job.lease_owner.is_none());
        assert_eq!(events.recv().await.unwrap(), JobEvent::Submitted(id));
    }

    #[test]
    fn test_payload_without_task_uses_default_type() {
        let params = JobCreateParams::from_payload(json!({"value": 1}));
        assert_eq!(params.job_type, DEFAULT_JOB_TYPE);
    }

    #[tokio::test]
    async fn test_claim_sets_lease_and_attempt() {
        let queue = make_queue(3);
        let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);
        let token = job.lease_owner.unwrap();
        assert!(token.starts_with("worker-test:"));

        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_current_token() {
        let queue = make_queue(3);
        let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
        let job = queue.claim_next().await.unwrap().unwrap();
        let token = job.lease_owner.unwrap();

        let err = queue
            .complete(id, "worker-test:stale", json!(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let done = queue.complete(id, &token, json!(1)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(json!(1)));

        let err = queue.complete(id, &token, json!(2)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_failures_exhaust_after_max_attempts() {
        let queue = make_queue(3);
        let id = queue.submit(json!({"task": "flaky"})).await.unwrap();

        for attempt in 1..=3 {
            let job = queue.claim_next().await.unwrap().unwrap();
            assert_eq!(job.attempts, attempt);
            let token = job.lease_owner.unwrap();
            let after = queue.record_failure(id, &token, "boom", true).await.unwrap();
            if attempt < 3 {
                assert_eq!(after.status, JobStatus::Pending);
            } else {
                assert_eq!(after.status, JobStatus::Failed);
                let failure = after.error.unwrap();
                assert_eq!(failure.kind, FailureKind::Exhausted);
                assert_eq!(failure.message, "boom");
            }
        }
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let queue = make_queue(3);
        let id = queue.submit(json!({"task": "echo"})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();

        let job = queue.record_failure(id, &token, "bad input", false).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.unwrap().kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn test_reclaim_requeues_then_fails_when_exhausted() {
        let queue = make_queue(2);
        let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
        let later = || Utc::now() + chrono::Duration::seconds(61);

        queue.claim_next().await.unwrap().unwrap();
        assert!(queue.reclaim_expired().await.unwrap().requeued.is_empty());

        let report = queue.reclaim_expired_at(later()).await.unwrap();
        assert_eq!(report.requeued, vec![id]);
        let job = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.lease_owner.is_none());

        queue.claim_next().await.unwrap().unwrap();
        let report = queue.reclaim_expired_at(later()).await.unwrap();
        assert_eq!(report.failed, vec![id]);
        let job = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, FailureKind::LeaseExpired);
    }

    #[tokio::test]
    async fn test_stale_worker_cannot_finalize_after_reclaim() {
        let queue = make_queue(3);
        let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
        let stale = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();

        queue
            .reclaim_expired_at(Utc::now() + chrono::Duration::seconds(61))
            .await
            .unwrap();
        let fresh = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        assert_ne!(stale, fresh);

        assert!(queue.complete(id, &stale, json!("late")).await.is_err());
        assert!(queue.renew_lease(id, &stale).await.is_err());
        let job = queue.complete(id, &fresh, json!("on time")).await.unwrap();
        assert_eq!(job.result, Some(json!("on time")));
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn test_stats_counts_each_status() {
        let queue = make_queue(3);
        queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
        queue.submit(json!({"task": "echo", "value": 2})).await.unwrap();
        let claimed = queue.claim_next().await.unwrap().unwrap();
        queue
            .complete(claimed.id, claimed.lease_owner.as_deref().unwrap(), json!(0))
            .await
            .unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.worker_id, "worker-test");
    }

    /// Applies writes, then reports the next `drops` of them as failed.
    /// The next `rejects` finalizing updates fail before being applied.
    #[derive(Debug)]
    struct DroppedAckStore {
        inner: MemoryJobStore,
        drops: AtomicU32,
        rejects: AtomicU32,
    }

    impl DroppedAckStore {
        fn new(drops: u32) -> Self {
            Self {
                inner: MemoryJobStore::new(),
                drops: AtomicU32::new(drops),
                rejects: AtomicU32::new(0),
            }
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        fn drop_ack(&self) -> bool {
            Self::take(&self.drops)
        }
    }

    #[async_trait]
    impl JobStore for DroppedAckStore {
        async fn create(&self, job: &Job) -> AppResult<()> {
            self.inner.create(job).await?;
            if self.drop_ack() {
                return Err(AppError::store_unavailable("connection reset after write"));
            }
            Ok(())
        }

        async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
            self.inner.get(id).await
        }

        async fn update(
            &self,
            id: JobId,
            expected: JobStatus,
            mutation: JobMutation<'_>,
        ) -> AppResult<Job> {
            if expected == JobStatus::Processing && Self::take(&self.rejects) {
                return Err(AppError::store_unavailable("connection refused"));
            }
            let job = self.inner.update(id, expected, mutation).await?;
            if expected == JobStatus::Processing && self.drop_ack() {
                return Err(AppError::store_unavailable("connection reset after write"));
            }
            Ok(job)
        }

        async fn list_by_status(&self, status: JobStatus, limit: usize) -> AppResult<Vec<JobId>> {
            self.inner.list_by_status(status, limit).await
        }

        async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
            self.inner.count_by_status(status).await
        }

        async fn health_check(&self) -> AppResult<bool> {
            Ok(true)
        }
    }

    fn queue_on(store: Arc<dyn JobStore>) -> JobQueue {
        let config = WorkerConfig {
            retry_base_delay_ms: 1,
            ..WorkerConfig::default()
        };
        JobQueue::new(store, JobEventBus::new(), &config, "worker-test".to_string())
    }

    #[tokio::test]
    async fn test_submit_survives_lost_create_ack() {
        let queue = queue_on(Arc::new(DroppedAckStore::new(1)));
        let mut events = queue.events().subscribe();

        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();

        let job = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(queue.store().count_by_status(JobStatus::Pending).await.unwrap(), 1);
        assert_eq!(events.recv().await.unwrap(), JobEvent::Submitted(id));
    }

    #[tokio::test]
    async fn test_complete_survives_lost_finalize_ack() {
        let store = Arc::new(DroppedAckStore::new(0));
        let queue = queue_on(Arc::clone(&store) as Arc<dyn JobStore>);
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        let mut events = queue.events().subscribe();
        store.drops.store(1, Ordering::SeqCst);

        let job = queue.complete(id, &token, json!(42)).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!(42)));
        assert_eq!(events.recv().await.unwrap(), JobEvent::Finalized(id));
    }

    #[tokio::test]
    async fn test_retry_release_survives_lost_ack() {
        let store = Arc::new(DroppedAckStore::new(0));
        let queue = queue_on(Arc::clone(&store) as Arc<dyn JobStore>);
        let id = queue.submit(json!({"task": "flaky"})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        store.drops.store(1, Ordering::SeqCst);

        let job = queue.record_failure(id, &token, "timeout", true).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_interrupted_stale_finalize_still_conflicts() {
        let store = Arc::new(DroppedAckStore::new(0));
        let queue = queue_on(Arc::clone(&store) as Arc<dyn JobStore>);
        let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
        let stale = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        queue
            .reclaim_expired_at(Utc::now() + chrono::Duration::seconds(61))
            .await
            .unwrap();
        let fresh = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        queue.complete(id, &fresh, json!("fresh")).await.unwrap();

        store.rejects.store(1, Ordering::SeqCst);
        let err = queue.complete(id, &stale, json!("stale")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let job = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(job.result, Some(json!("fresh")));
    }
}
