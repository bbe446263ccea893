//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use jobline_core::config::AppConfig;
use jobline_service::JobStatusReader;
use jobline_store::StoreManager;
use jobline_worker::JobQueue;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Job store (Redis or in-memory)
    pub store: Arc<StoreManager>,
    /// Job queue, used for statistics
    pub queue: Arc<JobQueue>,
    /// Long-poll status reader
    pub status_reader: Arc<JobStatusReader>,
}
