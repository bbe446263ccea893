//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field has a default, so an empty configuration is valid.

pub mod app;
pub mod logging;
pub mod poll;
pub mod store;
pub mod worker;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::logging::LoggingConfig;
use self::poll::PollConfig;
use self::store::StoreConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Job store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Long-poll status reader settings.
    #[serde(default)]
    pub poll: PollConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files under `dir`.
    ///
    /// Merges `<dir>/default.toml` with an environment-specific overlay
    /// `<dir>/<env>.toml` and environment variables prefixed with `JOBLINE__`
    /// (e.g. `JOBLINE__WORKER__CONCURRENCY=8`). Missing files are skipped.
    pub fn load(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("JOBLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.validate()?;
        Ok(app)
    }

    /// Reject settings the queue cannot operate with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.worker.max_attempts == 0 {
            return Err(AppError::configuration("worker.max_attempts must be at least 1"));
        }
        if self.worker.lease_duration_seconds == 0 {
            return Err(AppError::configuration(
                "worker.lease_duration_seconds must be at least 1",
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(AppError::configuration("worker.concurrency must be at least 1"));
        }
        if self.poll.interval_ms == 0 {
            return Err(AppError::configuration("poll.interval_ms must be at least 1"));
        }
        if self.poll.max_wait_seconds > poll::MAX_WAIT_CEILING_SECONDS {
            return Err(AppError::configuration(format!(
                "poll.max_wait_seconds must not exceed {}",
                poll::MAX_WAIT_CEILING_SECONDS
            )));
        }
        Ok(())
    }
}
