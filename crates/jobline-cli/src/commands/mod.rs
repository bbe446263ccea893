//! CLI command definitions and dispatch.

pub mod stats;
pub mod status;
pub mod submit;
pub mod sweep;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use jobline_core::config::AppConfig;
use jobline_core::error::AppError;
use jobline_core::events::JobEventBus;
use jobline_store::{JobStore, StoreManager};
use jobline_worker::JobQueue;

use crate::output::{self, OutputFormat};

/// Jobline: durable job queue with long-poll status reads
#[derive(Debug, Parser)]
#[command(name = "jobline", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding default.toml and environment overlays
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Configuration environment overlay (defaults to $JOBLINE_ENV or "development")
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a new job
    Submit(submit::SubmitArgs),
    /// Show a job, optionally waiting for it to finish
    Status(status::StatusArgs),
    /// Show job counts per status
    Stats,
    /// Reclaim jobs whose worker lease has expired
    Sweep,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let ctx = CliContext::connect(&self.config, self.env.as_deref()).await?;

        match &self.command {
            Commands::Submit(args) => submit::execute(args, &ctx, self.format).await,
            Commands::Status(args) => status::execute(args, &ctx, self.format).await,
            Commands::Stats => stats::execute(&ctx, self.format).await,
            Commands::Sweep => sweep::execute(&ctx, self.format).await,
        }
    }
}

/// Store handles shared by every command.
#[derive(Debug)]
pub struct CliContext {
    /// Loaded configuration
    pub config: AppConfig,
    /// Configured job store
    pub store: Arc<dyn JobStore>,
    /// Event bus (local to this process)
    pub events: JobEventBus,
    /// Queue acting on behalf of this CLI invocation
    pub queue: JobQueue,
}

impl CliContext {
    /// Load configuration and connect to the configured store.
    pub async fn connect(config_dir: &str, env: Option<&str>) -> Result<Self, AppError> {
        let env = env
            .map(str::to_string)
            .or_else(|| std::env::var("JOBLINE_ENV").ok())
            .unwrap_or_else(|| "development".to_string());
        let config = AppConfig::load(config_dir, &env)?;

        if config.store.provider == "memory" {
            output::print_warning(
                "store.provider is 'memory': this CLI sees only its own, empty, in-process store",
            );
        }

        tracing::debug!(config_dir, env = %env, provider = %config.store.provider, "Connecting to job store");
        let store = StoreManager::new(&config.store).await?.store();
        let events = JobEventBus::new();
        let worker_id = format!("cli-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let queue = JobQueue::new(Arc::clone(&store), events.clone(), &config.worker, worker_id);

        Ok(Self {
            config,
            store,
            events,
            queue,
        })
    }
}
