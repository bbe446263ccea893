//! `stats` command.

use serde::Serialize;
use tabled::Tabled;

use jobline_core::error::AppError;

use super::CliContext;
use crate::output::{self, OutputFormat};

/// Job count for one status
#[derive(Debug, Serialize, Tabled)]
struct StatusCount {
    /// Status name
    #[tabled(rename = "Status")]
    status: &'static str,
    /// Jobs in that status
    #[tabled(rename = "Jobs")]
    count: u64,
}

/// Execute `stats`
pub async fn execute(ctx: &CliContext, format: OutputFormat) -> Result<(), AppError> {
    let stats = ctx.queue.stats().await?;

    let rows = [
        StatusCount { status: "PENDING", count: stats.pending },
        StatusCount { status: "PROCESSING", count: stats.processing },
        StatusCount { status: "COMPLETED", count: stats.completed },
        StatusCount { status: "FAILED", count: stats.failed },
    ];

    output::print_list(&rows, format);
    if format == OutputFormat::Table {
        output::print_kv("Store", &ctx.config.store.provider);
    }
    Ok(())
}
