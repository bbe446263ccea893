//! Jobline Server: durable job queue with long-poll status reads
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use jobline_api::{AppState, build_app};
use jobline_core::config::AppConfig;
use jobline_core::error::AppError;
use jobline_core::events::JobEventBus;
use jobline_service::JobStatusReader;
use jobline_store::StoreManager;
use jobline_worker::jobs::{DelayJobHandler, EchoJobHandler};
use jobline_worker::{CronScheduler, JobExecutor, JobQueue, WorkerRunner};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let dir = std::env::var("JOBLINE_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let env = std::env::var("JOBLINE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&dir, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Jobline v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Job store ────────────────────────────────────────
    tracing::info!(provider = %config.store.provider, "Initializing job store...");
    let store_manager = Arc::new(StoreManager::new(&config.store).await?);
    let store = store_manager.store();
    tracing::info!("Job store initialized");

    // ── Step 2: Queue and status reader ──────────────────────────
    let events = JobEventBus::new();
    let worker_id = config.worker.resolve_worker_id();

    let job_queue = Arc::new(JobQueue::new(
        Arc::clone(&store),
        events.clone(),
        &config.worker,
        worker_id,
    ));
    let status_reader = Arc::new(JobStatusReader::new(
        Arc::clone(&store),
        events.clone(),
        &config.poll,
    ));

    // ── Step 3: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    // ── Step 4: Background worker + reclaim sweep ────────────────
    let (worker_handle, scheduler) = if config.worker.enabled {
        tracing::info!(worker_id = %job_queue.worker_id(), "Starting background worker...");

        let mut job_executor = JobExecutor::new();
        job_executor.register(Arc::new(EchoJobHandler));
        job_executor.register(Arc::new(DelayJobHandler));
        let job_executor = Arc::new(job_executor);

        let worker_runner =
            WorkerRunner::new(Arc::clone(&job_queue), job_executor, &config.worker)
                .with_shutdown_grace(shutdown_grace);

        let scheduler = CronScheduler::new(Arc::clone(&job_queue)).await?;
        scheduler
            .register_reclaim_sweep(&config.worker.reclaim_schedule)
            .await?;
        scheduler.start().await?;

        let worker_cancel = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            worker_runner.run(worker_cancel).await;
        });

        tracing::info!("Background worker started");
        (Some(handle), Some(scheduler))
    } else {
        tracing::info!("Background worker disabled");
        (None, None)
    };

    // ── Step 5: Build and start HTTP server ──────────────────────
    let app_state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::clone(&store_manager),
        queue: Arc::clone(&job_queue),
        status_reader,
    };
    let app = build_app(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("Jobline server listening on {}", addr);

    // ── Step 6: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 7: Wait for background tasks ────────────────────────
    tracing::info!("Waiting for in-flight jobs to finish...");

    if let Some(handle) = worker_handle {
        // The runner bounds its own drain; this only guards against a hung join.
        if tokio::time::timeout(shutdown_grace + Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            tracing::warn!("Worker did not stop in time; leases will be reclaimed");
        }
    }
    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler shutdown failed");
        }
    }

    tracing::info!("Jobline server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
