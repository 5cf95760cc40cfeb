use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::domain::JobId;

const STATUS_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of an import job as seen by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Success,
    Failed,
    /// No status store is configured, so the outcome cannot be known.
    Unknown,
}

/// Outcome record written once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_file: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self::bare(JobState::Pending)
    }

    pub fn unknown() -> Self {
        Self::bare(JobState::Unknown)
    }

    pub fn success(processed: u64) -> Self {
        Self {
            status: JobState::Success,
            processed,
            failed: 0,
            failed_file: None,
        }
    }

    pub fn failed(processed: u64, failed: u64, failed_file: String) -> Self {
        Self {
            status: JobState::Failed,
            processed,
            failed,
            failed_file: Some(failed_file),
        }
    }

    fn bare(status: JobState) -> Self {
        Self {
            status,
            processed: 0,
            failed: 0,
            failed_file: None,
        }
    }
}

pub fn status_key(job_id: &JobId) -> String {
    format!("import:job:{job_id}")
}

/// Durable key-value record of job outcomes, visible across processes.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    async fn set(&self, job_id: &JobId, status: &JobStatus) -> Result<(), StatusStoreError>;
    async fn get(&self, job_id: &JobId) -> Result<Option<JobStatus>, StatusStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StatusStoreError {
    #[error("status store backend error: {0}")]
    Backend(String),
    #[error("malformed job status record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Status store backed by Redis, one JSON string per job key.
#[derive(Clone)]
pub struct RedisJobStatusStore {
    conn: ConnectionManager,
}

impl RedisJobStatusStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self, StatusStoreError> {
        let client =
            redis::Client::open(url).map_err(|err| StatusStoreError::Backend(err.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| StatusStoreError::Backend(err.to_string()))?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl JobStatusStore for RedisJobStatusStore {
    async fn set(&self, job_id: &JobId, status: &JobStatus) -> Result<(), StatusStoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(status)?;
        conn.set::<_, _, ()>(status_key(job_id), json)
            .await
            .map_err(|err| StatusStoreError::Backend(format!("redis SET error: {err}")))
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobStatus>, StatusStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(status_key(job_id))
            .await
            .map_err(|err| StatusStoreError::Backend(format!("redis GET error: {err}")))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Process-local store for tests and single-process setups.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStatusStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl JobStatusStore for InMemoryJobStatusStore {
    async fn set(&self, job_id: &JobId, status: &JobStatus) -> Result<(), StatusStoreError> {
        let json = serde_json::to_string(status)?;
        self.entries
            .lock()
            .map_err(|_| StatusStoreError::Backend("status store poisoned".to_string()))?
            .insert(status_key(job_id), json);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobStatus>, StatusStoreError> {
        let raw = self
            .entries
            .lock()
            .map_err(|_| StatusStoreError::Backend("status store poisoned".to_string()))?
            .get(&status_key(job_id))
            .cloned();

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Optional status store seen through the degradation rules of the pipeline.
///
/// Writes are best-effort and bounded by a timeout; reads report `unknown`
/// when no store is configured and `pending` when no record exists yet.
#[derive(Clone, Default)]
pub struct StatusTracker {
    store: Option<Arc<dyn JobStatusStore>>,
}

impl StatusTracker {
    pub fn new(store: Option<Arc<dyn JobStatusStore>>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub async fn record(&self, job_id: &JobId, status: &JobStatus) {
        let Some(store) = &self.store else {
            tracing::debug!(job_id = %job_id, "status store not configured; skipping status write");
            return;
        };

        match tokio::time::timeout(STATUS_WRITE_TIMEOUT, store.set(job_id, status)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to write job status");
            }
            Err(_) => {
                tracing::error!(job_id = %job_id, "timed out writing job status");
            }
        }
    }

    pub async fn lookup(&self, job_id: &JobId) -> Result<JobStatus, StatusStoreError> {
        let Some(store) = &self.store else {
            return Ok(JobStatus::unknown());
        };

        Ok(store.get(job_id).await?.unwrap_or_else(JobStatus::pending))
    }
}
