//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

use jobline_api::{AppState, build_app};
use jobline_core::config::AppConfig;
use jobline_core::events::JobEventBus;
use jobline_core::types::JobId;
use jobline_service::JobStatusReader;
use jobline_store::StoreManager;
use jobline_worker::jobs::{DelayJobHandler, EchoJobHandler};
use jobline_worker::{JobExecutor, JobQueue, WorkerRunner};

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Queue sharing the app's store, for submitting jobs
    pub queue: Arc<JobQueue>,
    /// Application config
    pub config: AppConfig,
    /// Stops the background worker when dropped
    _shutdown: Option<watch::Sender<bool>>,
}

impl TestApp {
    /// App backed by an in-memory store with no worker running.
    pub async fn new() -> Self {
        Self::build(false).await
    }

    /// App with a background worker running echo and delay handlers.
    pub async fn with_worker() -> Self {
        Self::build(true).await
    }

    /// Test configuration: in-memory store, fast polling.
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.provider = "memory".to_string();
        config.worker.worker_id = Some("worker-it".to_string());
        config.worker.concurrency = 2;
        config.worker.poll_interval_ms = 50;
        config.worker.retry_base_delay_ms = 1;
        config.worker.retry_max_delay_ms = 10;
        config.poll.interval_ms = 50;
        config
    }

    async fn build(with_worker: bool) -> Self {
        let config = Self::test_config();

        let store_manager = Arc::new(
            StoreManager::new(&config.store)
                .await
                .expect("Failed to init store"),
        );
        let store = store_manager.store();
        let events = JobEventBus::new();

        let queue = Arc::new(JobQueue::new(
            Arc::clone(&store),
            events.clone(),
            &config.worker,
            config.worker.worker_id.clone().unwrap_or_default(),
        ));
        let status_reader = Arc::new(JobStatusReader::new(store, events, &config.poll));

        let shutdown = if with_worker {
            let mut executor = JobExecutor::new();
            executor.register(Arc::new(EchoJobHandler));
            executor.register(Arc::new(DelayJobHandler));

            let runner = WorkerRunner::new(Arc::clone(&queue), Arc::new(executor), &config.worker)
                .with_shutdown_grace(Duration::from_secs(1));
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move { runner.run(rx).await });
            Some(tx)
        } else {
            None
        };

        let app_state = AppState {
            config: Arc::new(config.clone()),
            store: store_manager,
            queue: Arc::clone(&queue),
            status_reader,
        };

        Self {
            router: build_app(app_state),
            queue,
            config,
            _shutdown: shutdown,
        }
    }

    /// Submit a job directly through the queue
    pub async fn submit(&self, payload: Value) -> JobId {
        self.queue.submit(payload).await.expect("Failed to submit job")
    }

    /// Make a GET request to the test app
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}
