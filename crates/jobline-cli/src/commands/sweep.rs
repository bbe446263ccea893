//! `sweep` command.

use jobline_core::error::AppError;

use super::CliContext;
use crate::output::{self, OutputFormat};

/// Execute `sweep`
pub async fn execute(ctx: &CliContext, format: OutputFormat) -> Result<(), AppError> {
    let report = ctx.queue.reclaim_expired().await?;

    match format {
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Table => {
            output::print_success(&format!(
                "Reclaim sweep examined {} expired lease(s)",
                report.scanned
            ));
            output::print_kv("Requeued", &report.requeued.len().to_string());
            output::print_kv("Failed", &report.failed.len().to_string());
            for id in &report.requeued {
                println!("  requeued {id}");
            }
            for id in &report.failed {
                println!("  failed   {id}");
            }
        }
    }
    Ok(())
}
