//! Redis job store implementation.
//!
//! Each record is a JSON string under `job:<id>`; a set per status indexes
//! ids for claim scans and reclaim sweeps. Creation and conditional update
//! run as Lua scripts so the record and its index move together.

use std::str::FromStr;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use jobline_core::error::{AppError, ErrorKind};
use jobline_core::result::AppResult;
use jobline_core::types::JobId;
use jobline_entity::{Job, JobStatus};

use super::client::RedisClient;
use crate::keys;
use crate::store::{JobMutation, JobStore, apply_mutation};

/// Lua script for atomic record creation.
///
/// KEYS[1] = job record key
/// KEYS[2] = status index key
/// ARGV[1] = serialized record
/// ARGV[2] = job id
///
/// Returns:
///   1 = created
///   0 = id already exists
const CREATE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[1])
    redis.call('SADD', KEYS[2], ARGV[2])
    return 1
"#;

/// Lua script for compare-and-swap on a serialized record.
///
/// KEYS[1] = job record key
/// KEYS[2] = index key of the observed status
/// KEYS[3] = index key of the new status
/// ARGV[1] = observed record
/// ARGV[2] = new record
/// ARGV[3] = job id
///
/// Returns:
///   1 = swapped
///   0 = record changed since it was observed
///  -1 = record missing
const CAS_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if not current then
        return -1
    end
    if current ~= ARGV[1] then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[2])
    if KEYS[2] ~= KEYS[3] then
        redis.call('SREM', KEYS[2], ARGV[3])
        redis.call('SADD', KEYS[3], ARGV[3])
    end
    return 1
"#;

/// Redis-backed job store for multi-node deployments.
#[derive(Debug, Clone)]
pub struct RedisJobStore {
    /// Redis client.
    client: RedisClient,
    /// Maximum compare-and-swap rounds per conditional update.
    max_cas_rounds: u32,
}

impl RedisJobStore {
    /// Create a new Redis job store.
    pub fn new(client: RedisClient, max_cas_rounds: u32) -> Self {
        Self {
            client,
            max_cas_rounds: max_cas_rounds.max(1),
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::StoreUnavailable, format!("Redis error: {e}"), e)
    }

    fn transition_keys(&self, id: JobId, from: JobStatus, to: JobStatus) -> keys::TransitionKeys {
        keys::transition(id, from, to).map(|k| self.client.prefixed_key(k))
    }

    async fn get_raw(&self, id: JobId) -> AppResult<Option<String>> {
        let key = self.client.prefixed_key(&keys::job_record(id));
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = conn.get(&key).await.map_err(Self::map_err)?;
        Ok(raw)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        let record = serde_json::to_string(job)?;
        let mut conn = self.client.conn_mut();

        let keys = self.transition_keys(job.id, job.status, job.status);

        let created: i64 = redis::Script::new(CREATE_SCRIPT)
            .key(keys.record)
            .key(keys.to_index)
            .arg(&record)
            .arg(job.id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        match created {
            1 => {
                debug!(job_id = %job.id, "Created job record in Redis");
                Ok(())
            }
            _ => Err(AppError::duplicate_id(format!("Job {} already exists", job.id))),
        }
    }

    async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
        match self.get_raw(id).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: JobMutation<'_>,
    ) -> AppResult<Job> {
        for round in 0..self.max_cas_rounds {
            let observed_raw = self
                .get_raw(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
            let observed: Job = serde_json::from_str(&observed_raw)?;

            let next = apply_mutation(&observed, expected, mutation)?;
            let next_raw = serde_json::to_string(&next)?;

            let keys = self.transition_keys(id, observed.status, next.status);
            let mut conn = self.client.conn_mut();
            let swapped: i64 = redis::Script::new(CAS_SCRIPT)
                .key(keys.record)
                .key(keys.from_index)
                .key(keys.to_index)
                .arg(&observed_raw)
                .arg(&next_raw)
                .arg(id.to_string())
                .invoke_async(&mut conn)
                .await
                .map_err(Self::map_err)?;

            match swapped {
                1 => return Ok(next),
                -1 => return Err(AppError::not_found(format!("Job {id} not found"))),
                _ => {
                    debug!(job_id = %id, round, "Job record changed during update, re-evaluating");
                }
            }
        }

        Err(AppError::conflict(format!(
            "Job {id} kept changing during {} update rounds",
            self.max_cas_rounds
        )))
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> AppResult<Vec<JobId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.client.prefixed_key(&keys::status_index(status));
        let mut conn = self.client.conn_mut();
        let members: Vec<String> = conn.smembers(&key).await.map_err(Self::map_err)?;

        let ids = members
            .iter()
            .filter_map(|member| match JobId::from_str(member) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(member = %member, error = %e, "Skipping malformed id in status index");
                    None
                }
            })
            .take(limit)
            .collect();
        Ok(ids)
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        let key = self.client.prefixed_key(&keys::status_index(status));
        let mut conn = self.client.conn_mut();
        let count: u64 = conn.scard(&key).await.map_err(Self::map_err)?;
        Ok(count)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
