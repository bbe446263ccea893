//! Delay job handler, for exercising long-polls and lease renewal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use jobline_entity::Job;

use crate::executor::{JobExecutionError, JobHandler};

/// Upper bound on a single delay job, in milliseconds.
const MAX_DELAY_MS: u64 = 10 * 60 * 1000;

/// Sleeps for `delay_ms` and then returns the payload's `value` field
/// (or `null` when absent).
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayJobHandler;

#[async_trait]
impl JobHandler for DelayJobHandler {
    fn job_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, job: &Job) -> Result<Value, JobExecutionError> {
        let delay_ms = job
            .payload
            .get("delay_ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                JobExecutionError::Permanent(
                    "delay payload needs a non-negative integer 'delay_ms'".to_string(),
                )
            })?;
        if delay_ms > MAX_DELAY_MS {
            return Err(JobExecutionError::Permanent(format!(
                "delay_ms {delay_ms} exceeds the {MAX_DELAY_MS} ms limit"
            )));
        }

        tracing::debug!(job_id = %job.id, delay_ms, "Delay job sleeping");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        Ok(job.payload.get("value").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_then_returns_value() {
        let job = Job::new("delay", json!({"delay_ms": 2000, "value": "done"}), 3, Utc::now());
        let started = tokio::time::Instant::now();

        let result = DelayJobHandler.execute(&job).await.unwrap();
        assert_eq!(result, json!("done"));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rejects_bad_delay() {
        let job = Job::new("delay", json!({"delay_ms": "soon"}), 3, Utc::now());
        assert!(matches!(
            DelayJobHandler.execute(&job).await,
            Err(JobExecutionError::Permanent(_))
        ));
    }
}
