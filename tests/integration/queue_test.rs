//! Cross-crate queue lifecycle tests on a shared store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use jobline_core::config::worker::WorkerConfig;
use jobline_core::events::JobEventBus;
use jobline_entity::{FailureKind, JobStatus};
use jobline_store::JobStore;
use jobline_store::memory::MemoryJobStore;
use jobline_worker::JobQueue;

fn queue_on(store: &Arc<dyn JobStore>, worker_id: &str, config: &WorkerConfig) -> Arc<JobQueue> {
    Arc::new(JobQueue::new(
        Arc::clone(store),
        JobEventBus::new(),
        config,
        worker_id.to_string(),
    ))
}

#[tokio::test]
async fn test_competing_workers_claim_each_job_once() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let config = WorkerConfig::default();
    let producer = queue_on(&store, "producer", &config);

    let mut submitted = HashSet::new();
    for n in 0..20 {
        submitted.insert(producer.submit(json!({"task": "echo", "value": n})).await.unwrap());
    }

    let mut tasks = Vec::new();
    for w in 0..4 {
        let queue = queue_on(&store, &format!("worker-{w}"), &config);
        tasks.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.claim_next().await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "job {id} claimed twice");
        }
    }
    assert_eq!(seen, submitted);
}

#[tokio::test]
async fn test_crashed_worker_job_is_rerun_elsewhere() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let config = WorkerConfig::default();
    let crashed = queue_on(&store, "worker-a", &config);
    let survivor = queue_on(&store, "worker-b", &config);

    let id = crashed.submit(json!({"task": "echo", "value": 7})).await.unwrap();
    let stale = crashed.claim_next().await.unwrap().unwrap();
    let stale_token = stale.lease_owner.clone().unwrap();

    let later = Utc::now() + ChronoDuration::seconds(config.lease_duration_seconds as i64 + 1);
    let report = survivor.reclaim_expired_at(later).await.unwrap();
    assert_eq!(report.requeued, vec![id]);

    let job = survivor.claim_next().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.attempts, 2);
    let token = job.lease_owner.clone().unwrap();
    assert!(token.starts_with("worker-b:"));

    // The crashed worker's late completion loses to the new lease.
    let err = crashed.complete(id, &stale_token, json!("stale")).await.unwrap_err();
    assert!(err.is_conflict());

    let done = survivor.complete(id, &token, json!(7)).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result, Some(json!(7)));
}

#[tokio::test]
async fn test_expired_last_attempt_fails() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let config = WorkerConfig {
        max_attempts: 1,
        ..WorkerConfig::default()
    };
    let queue = queue_on(&store, "worker-a", &config);

    let id = queue.submit(json!({"task": "echo", "value": 1})).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();

    let later = Utc::now() + ChronoDuration::seconds(config.lease_duration_seconds as i64 + 1);
    let report = queue.reclaim_expired_at(later).await.unwrap();
    assert_eq!(report.failed, vec![id]);

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, FailureKind::LeaseExpired);
    assert!(job.lease_owner.is_none());
}
