//! `status` command.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use jobline_core::error::AppError;
use jobline_core::types::JobId;
use jobline_entity::Job;
use jobline_service::JobStatusReader;

use super::CliContext;
use crate::output::{self, OutputFormat};

/// Arguments for `status`
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job ID
    pub id: String,
    /// Seconds to wait for the job to finish (capped by poll.max_wait_seconds)
    #[arg(short, long, default_value_t = 0)]
    pub wait: u64,
}

/// One job as a table row
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    /// Job ID
    #[tabled(rename = "ID")]
    pub id: String,
    /// Job type
    #[tabled(rename = "Type")]
    pub job_type: String,
    /// Status
    #[tabled(rename = "Status")]
    pub status: String,
    /// Attempts used / allowed
    #[tabled(rename = "Attempts")]
    pub attempts: String,
    /// Last update
    #[tabled(rename = "Updated")]
    pub updated_at: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type.clone(),
            status: job.status.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_attempts),
            updated_at: job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute `status`
pub async fn execute(args: &StatusArgs, ctx: &CliContext, format: OutputFormat) -> Result<(), AppError> {
    let id = JobId::from_str(&args.id)
        .map_err(|_| AppError::validation(format!("Invalid job ID: {}", args.id)))?;

    let reader = JobStatusReader::new(Arc::clone(&ctx.store), ctx.events.clone(), &ctx.config.poll);
    let job = reader.poll(id, Duration::from_secs(args.wait)).await?;

    match format {
        OutputFormat::Json => output::print_json(&job),
        OutputFormat::Table => print_job(&job),
    }
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job {}:", job.id);
    output::print_kv("Type", &job.job_type);
    output::print_kv("Status", job.status.as_str());
    output::print_kv("Attempts", &format!("{}/{}", job.attempts, job.max_attempts));
    output::print_kv("Payload", &job.payload.to_string());
    if let Some(result) = &job.result {
        output::print_kv("Result", &result.to_string());
    }
    if let Some(error) = &job.error {
        output::print_kv("Error", &format!("[{}] {}", error.kind, error.message));
    }
    if let (Some(owner), Some(expires)) = (&job.lease_owner, job.lease_expires_at) {
        output::print_kv("Lease", &format!("{owner} until {}", expires.to_rfc3339()));
    }
    output::print_kv("Created", &job.created_at.to_rfc3339());
    output::print_kv("Updated", &job.updated_at.to_rfc3339());
}
