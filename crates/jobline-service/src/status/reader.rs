//! Long-poll status reader.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing;

use jobline_core::config::poll::PollConfig;
use jobline_core::error::AppError;
use jobline_core::events::{JobEvent, JobEventBus};
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::Job;
use jobline_store::JobStore;

/// Reads job records, optionally waiting for them to reach a terminal state.
///
/// A waiting poll holds no store connection or lock between reads. It wakes
/// on a `Finalized` event for its job (same process) or on the fixed poll
/// interval (any process), whichever comes first.
#[derive(Debug, Clone)]
pub struct JobStatusReader {
    /// Job record store
    store: Arc<dyn JobStore>,
    /// Lifecycle notifications from in-process workers
    events: JobEventBus,
    /// Re-read interval while waiting
    interval: Duration,
    /// Server-side cap on any requested wait
    max_wait: Duration,
}

impl JobStatusReader {
    /// Create a new status reader
    pub fn new(store: Arc<dyn JobStore>, events: JobEventBus, config: &PollConfig) -> Self {
        Self {
            store,
            events,
            interval: config.interval().max(Duration::from_millis(1)),
            max_wait: config.max_wait(),
        }
    }

    /// Server-side cap on any requested wait
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// The wait actually applied for a requested `wait`.
    pub fn effective_wait(&self, wait: Duration) -> Duration {
        wait.min(self.max_wait)
    }

    /// Read the current record without waiting.
    pub async fn get(&self, id: JobId) -> AppResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))
    }

    /// Return the job once it is terminal or `wait` (capped) has elapsed.
    ///
    /// A missing job fails with `NotFound` immediately, whatever the wait.
    pub async fn poll(&self, id: JobId, wait: Duration) -> AppResult<Job> {
        // Subscribe before the first read so a finalize in between is not missed.
        let mut events = self.events.subscribe();
        let mut job = self.get(id).await?;

        let wait = self.effective_wait(wait);
        if wait.is_zero() || job.is_terminal() {
            return Ok(job);
        }

        let deadline = Instant::now() + wait;
        tracing::debug!(
            job_id = %id,
            status = %job.status,
            wait_ms = wait.as_millis() as u64,
            "Long-polling job"
        );

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(job);
            }
            let next_read = (now + self.interval).min(deadline);

            tokio::select! {
                _ = time::sleep_until(next_read) => {}
                _ = wait_for_finalized(&mut events, id) => {}
            }

            job = self.get(id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
        }
    }
}

/// Resolve once `id` is announced as finalized (or events were dropped).
async fn wait_for_finalized(events: &mut broadcast::Receiver<JobEvent>, id: JobId) {
    loop {
        match events.recv().await {
            Ok(JobEvent::Finalized(finalized)) if finalized == id => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobline_core::config::worker::WorkerConfig;
    use jobline_core::error::ErrorKind;
    use jobline_entity::JobStatus;
    use jobline_store::memory::MemoryJobStore;
    use jobline_worker::JobQueue;
    use serde_json::json;

    fn setup() -> (Arc<JobQueue>, JobStatusReader) {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let events = JobEventBus::new();
        let queue = Arc::new(JobQueue::new(
            Arc::clone(&store),
            events.clone(),
            &WorkerConfig::default(),
            "worker-test".to_string(),
        ));
        let reader = JobStatusReader::new(store, events, &PollConfig::default());
        (queue, reader)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_poll_returns_pending() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();

        let job = reader.poll(id, Duration::ZERO).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_after_completion_returns_result() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();
        queue.complete(id, &token, json!(42)).await.unwrap();

        let first = reader.poll(id, Duration::ZERO).await.unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(first.result, Some(json!(42)));

        let started = Instant::now();
        let again = reader.poll(id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_when_job_finishes() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(2)).await;
                queue.complete(id, &token, json!(42)).await.unwrap();
            })
        };

        let started = Instant::now();
        let job = reader.poll(id, Duration::from_secs(5)).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(elapsed >= Duration::from_secs(2), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(2500), "returned late: {elapsed:?}");
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_on_stuck_job() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();
        queue.claim_next().await.unwrap().unwrap();

        let started = Instant::now();
        let job = reader.poll(id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_is_not_found() {
        let (_queue, reader) = setup();

        let started = Instant::now();
        let err = reader.poll(JobId::new(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_capped() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "echo", "value": 42})).await.unwrap();

        assert_eq!(
            reader.effective_wait(Duration::from_secs(9999)),
            Duration::from_secs(30)
        );

        let started = Instant::now();
        let job = reader.poll(id, Duration::from_secs(9999)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_does_not_end_the_wait() {
        let (queue, reader) = setup();
        let id = queue.submit(json!({"task": "flaky"})).await.unwrap();
        let token = queue.claim_next().await.unwrap().unwrap().lease_owner.unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(1)).await;
                queue.record_failure(id, &token, "retry me", true).await.unwrap();
            })
        };

        let job = reader.poll(id, Duration::from_secs(3)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        worker.await.unwrap();
    }
}
