//! `submit` command.

use clap::Args;

use jobline_core::error::AppError;
use jobline_worker::JobCreateParams;

use super::CliContext;
use crate::output::{self, OutputFormat};
use super::status::JobRow;

/// Arguments for `submit`
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// JSON payload, e.g. '{"task":"echo","value":42}'
    pub payload: String,
    /// Job type; defaults to the payload's "task" field
    #[arg(short = 't', long)]
    pub job_type: Option<String>,
    /// Maximum attempts; defaults to worker.max_attempts
    #[arg(short, long)]
    pub max_attempts: Option<u32>,
}

/// Execute `submit`
pub async fn execute(args: &SubmitArgs, ctx: &CliContext, format: OutputFormat) -> Result<(), AppError> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .map_err(|e| AppError::validation(format!("Invalid JSON payload: {e}")))?;

    let mut params = JobCreateParams::from_payload(payload);
    if let Some(job_type) = &args.job_type {
        params.job_type = job_type.clone();
    }
    params.max_attempts = args.max_attempts;

    let job = ctx.queue.enqueue(params).await?;

    match format {
        OutputFormat::Json => output::print_json(&job),
        OutputFormat::Table => {
            output::print_success(&format!("Submitted job {}", job.id));
            output::print_list(&[JobRow::from(&job)], format);
        }
    }
    Ok(())
}
