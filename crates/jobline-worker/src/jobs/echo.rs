//! Echo job handler.

use async_trait::async_trait;
use serde_json::Value;

use jobline_entity::Job;

use crate::executor::{JobExecutionError, JobHandler};

/// Returns the payload's `value` field as the job result.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoJobHandler;

#[async_trait]
impl JobHandler for EchoJobHandler {
    fn job_type(&self) -> &str {
        "echo"
    }

    async fn execute(&self, job: &Job) -> Result<Value, JobExecutionError> {
        job.payload.get("value").cloned().ok_or_else(|| {
            JobExecutionError::Permanent("echo payload is missing 'value'".to_string())
        })
    }
}
