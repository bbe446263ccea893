//! Background job processing for Jobline.
//!
//! This crate provides:
//! - A job queue with the producer and worker-side state transitions
//! - A worker runner that claims jobs under a lease and executes them
//! - A job executor that dispatches jobs to the correct handler
//! - A cron scheduler for the expired-lease reclaim sweep

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use queue::{JobCreateParams, JobQueue, QueueStats, ReclaimReport};
pub use runner::WorkerRunner;
pub use scheduler::CronScheduler;
