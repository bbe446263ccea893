//! Worker runner: main loop that claims jobs and executes them.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, watch};
use tokio::task::JoinError;
use tokio::time::{self, Instant};
use tracing;

use jobline_core::config::worker::WorkerConfig;
use jobline_core::events::JobEvent;
use jobline_core::types::JobId;
use jobline_entity::Job;

use crate::executor::{JobExecutionError, JobExecutor};
use crate::queue::JobQueue;

/// Lower bound on the lease renewal period.
const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(100);

/// Main worker runner that claims jobs and executes them
#[derive(Debug)]
pub struct WorkerRunner {
    /// Job queue for claiming and finalizing
    queue: Arc<JobQueue>,
    /// Job executor for dispatching
    executor: Arc<JobExecutor>,
    /// Concurrent execution slots
    concurrency: usize,
    /// Idle interval between claim scans
    poll_interval: Duration,
    /// How long shutdown waits for in-flight jobs
    shutdown_grace: Duration,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, config: &WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
            shutdown_grace: Duration::from_secs(30),
        }
    }

    /// Set how long shutdown waits for in-flight jobs
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Start the worker runner: runs until the cancel signal is received
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let worker_id = self.queue.worker_id().to_string();
        tracing::info!(
            worker_id = %worker_id,
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            handlers = ?self.executor.registered_types(),
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut events = self.queue.events().subscribe();

        loop {
            if *cancel.borrow() {
                tracing::info!(worker_id = %worker_id, "Worker received shutdown signal");
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.claim_next().await {
                Ok(Some(job)) => {
                    self.spawn_job(job, permit);
                    continue;
                }
                Ok(None) => {
                    drop(permit);
                    tracing::trace!(worker_id = %worker_id, "No pending jobs");
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(worker_id = %worker_id, error = %e, "Failed to claim job");
                }
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = wait_for_claimable(&mut events) => {}
                _ = time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!(worker_id = %worker_id, "Worker waiting for in-flight jobs to complete");

        let max_permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if time::timeout(self.shutdown_grace, semaphore.acquire_many(max_permits))
            .await
            .is_err()
        {
            tracing::warn!(
                worker_id = %worker_id,
                grace_seconds = self.shutdown_grace.as_secs(),
                "In-flight jobs still running at shutdown; their leases will expire"
            );
        }

        tracing::info!(worker_id = %worker_id, "Worker shut down complete");
    }

    /// Execute a claimed job on its own task, holding `permit` until finalized
    fn spawn_job(&self, job: Job, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let executor = Arc::clone(&self.executor);

        tokio::spawn(async move {
            let _permit = permit;
            process_job(queue, executor, job).await;
        });
    }
}

/// Run one claimed job through execution and finalize.
async fn process_job(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, job: Job) {
    let job_id = job.id;
    let Some(token) = job.lease_owner.clone() else {
        tracing::error!(job_id = %job_id, "Claimed job has no lease token");
        return;
    };

    tracing::info!(
        job_id = %job_id,
        job_type = %job.job_type,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    let renewal = tokio::spawn(renew_lease_loop(Arc::clone(&queue), job_id, token.clone()));

    // Handler runs on its own task so a panic surfaces as a JoinError.
    let execution = tokio::spawn(async move { executor.execute(&job).await });
    let outcome = match execution.await {
        Ok(outcome) => outcome,
        Err(join_err) => Err(JobExecutionError::Panicked(panic_message(join_err))),
    };

    renewal.abort();

    let finalized = match outcome {
        Ok(result) => queue.complete(job_id, &token, result).await,
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                retryable = e.is_retryable(),
                error = %e,
                "Job attempt failed"
            );
            queue
                .record_failure(job_id, &token, &e.to_string(), e.is_retryable())
                .await
        }
    };

    match finalized {
        Ok(job) => {
            tracing::info!(job_id = %job_id, status = %job.status, "Job finalized");
        }
        Err(e) if e.is_conflict() || e.is_not_found() => {
            tracing::warn!(
                job_id = %job_id,
                lease_owner = %token,
                error = %e,
                "Lease lost before finalize; outcome discarded"
            );
        }
        Err(e) => {
            tracing::error!(
                job_id = %job_id,
                error = %e,
                "Failed to finalize job; leaving it for the reclaim sweep"
            );
        }
    }
}

/// Extend the lease every third of its duration until it is lost or aborted.
async fn renew_lease_loop(queue: Arc<JobQueue>, job_id: JobId, token: String) {
    let period = (queue.lease_duration() / 3).max(MIN_RENEWAL_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;
        match queue.renew_lease(job_id, &token).await {
            Ok(job) => {
                tracing::trace!(job_id = %job_id, lease_expires_at = ?job.lease_expires_at, "Renewed lease");
            }
            Err(e) if e.is_conflict() || e.is_not_found() => {
                tracing::warn!(job_id = %job_id, lease_owner = %token, "Lease lost; stopping renewal");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Lease renewal failed; will retry");
            }
        }
    }
}

/// Resolve once an event signals claimable work (or events were dropped).
async fn wait_for_claimable(events: &mut broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_claimable() => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "job task was cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
