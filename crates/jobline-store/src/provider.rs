//! Store manager that dispatches to the configured backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use jobline_core::config::store::StoreConfig;
use jobline_core::error::AppError;
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::{Job, JobStatus};

use crate::store::{JobMutation, JobStore};

/// Store manager that wraps the configured job store backend.
///
/// The backend is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// The inner store backend.
    inner: Arc<dyn JobStore>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn JobStore> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis job store");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisJobStore::new(
                    client,
                    config.redis.max_cas_rounds,
                ))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory job store");
                Arc::new(crate::memory::MemoryJobStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing backend (for testing).
    pub fn from_store(store: Arc<dyn JobStore>) -> Self {
        Self { inner: store }
    }

    /// Get a shared handle to the inner backend.
    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.inner)
    }
}

#[async_trait]
impl JobStore for StoreManager {
    async fn create(&self, job: &Job) -> AppResult<()> {
        self.inner.create(job).await
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
        self.inner.update(id, expected, mutation).await
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> AppResult<Vec<JobId>> {
        self.inner.list_by_status(status, limit).await
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        self.inner.count_by_status(status).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
