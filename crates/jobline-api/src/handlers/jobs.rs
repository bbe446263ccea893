//! Job status handlers.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};

use jobline_core::error::AppError;
use jobline_core::types::JobId;

use crate::dto::request::PollQuery;
use crate::dto::response::{JobResponse, QueueStatsResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /jobs/{id}?wait={seconds}
///
/// Returns the job once it is terminal or the (capped) wait has elapsed.
/// An id that does not parse cannot exist, so it is reported as not found.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id = JobId::from_str(&id)
        .map_err(|_| AppError::not_found(format!("Job {id} not found")))?;

    let job = state.status_reader.poll(job_id, query.wait()).await?;
    Ok(Json(JobResponse::from(job)))
}

/// GET /jobs/stats
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(QueueStatsResponse::from(stats)))
}
