use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};

use super::domain::{FailedRow, JobId};
use crate::config::ArtifactStorageConfig;

const ARTIFACT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a failure artifact: the raw row and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub record: BTreeMap<String, String>,
    pub error: String,
}

impl From<&FailedRow> for FailureEntry {
    fn from(row: &FailedRow) -> Self {
        Self {
            record: row.raw_fields.clone(),
            error: row.summary(),
        }
    }
}

/// Durable external storage for failure artifacts.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Store `body` under `key` and return a time-limited retrieval URL.
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String, ArtifactError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to serialize failure artifact: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write local artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact upload failed: {0}")]
    Upload(String),
}

/// S3 (or S3-compatible) bucket receiving artifacts, handing out presigned GET URLs.
pub struct S3ArtifactStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3ArtifactStorage {
    pub async fn from_config(config: &ArtifactStorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            url_ttl: config.url_ttl,
        }
    }
}

#[async_trait]
impl ArtifactStorage for S3ArtifactStorage {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String, ArtifactError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(mime::APPLICATION_JSON.as_ref())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| ArtifactError::Upload(err.to_string()))?;

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|err| ArtifactError::Upload(err.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| ArtifactError::Upload(err.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Where a job's failure report can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactReference {
    /// Signed URL into external storage.
    Remote(String),
    /// Machine-local path; only meaningful on the host that ran the job.
    Local(PathBuf),
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactReference::Remote(url) => f.write_str(url),
            ArtifactReference::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn artifact_key(job_id: &JobId) -> String {
    format!("imports/failed-{job_id}.json")
}

pub fn local_artifact_path(work_dir: &Path, job_id: &JobId) -> PathBuf {
    work_dir.join(format!("import-failed-{job_id}.json"))
}

/// Writes the failure report locally and, when storage is configured,
/// uploads it under a job-scoped key.
#[derive(Clone)]
pub struct FailureArtifactPublisher {
    work_dir: PathBuf,
    storage: Option<Arc<dyn ArtifactStorage>>,
    upload_timeout: Duration,
}

impl FailureArtifactPublisher {
    pub fn new(work_dir: PathBuf, storage: Option<Arc<dyn ArtifactStorage>>) -> Self {
        Self {
            work_dir,
            storage,
            upload_timeout: ARTIFACT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Never fails: upload or local write problems are logged and the local
    /// path is returned as the reference.
    pub async fn publish(&self, job_id: &JobId, failures: &[FailedRow]) -> ArtifactReference {
        let local_path = local_artifact_path(&self.work_dir, job_id);

        let body = match serialize(failures) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to serialize failure artifact");
                return ArtifactReference::Local(local_path);
            }
        };

        if let Err(err) = write_local(&local_path, &body).await {
            tracing::error!(job_id = %job_id, error = %err, "failed to write local failure artifact");
        }

        let Some(storage) = &self.storage else {
            return ArtifactReference::Local(local_path);
        };

        let key = artifact_key(job_id);
        let upload = storage.upload(&key, body);
        let error = match tokio::time::timeout(self.upload_timeout, upload).await {
            Ok(Ok(url)) => {
                tracing::info!(job_id = %job_id, rows = failures.len(), "uploaded failure artifact");
                return ArtifactReference::Remote(url);
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {:?}", self.upload_timeout),
        };

        tracing::error!(
            job_id = %job_id,
            error = %error,
            path = %local_path.display(),
            "artifact upload failed; falling back to local path"
        );
        ArtifactReference::Local(local_path)
    }
}

fn serialize(failures: &[FailedRow]) -> Result<Vec<u8>, ArtifactError> {
    let entries: Vec<FailureEntry> = failures.iter().map(FailureEntry::from).collect();
    Ok(serde_json::to_vec_pretty(&entries)?)
}

async fn write_local(path: &Path, body: &[u8]) -> Result<(), ArtifactError> {
    let to_error = |source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(to_error)?;
    }
    tokio::fs::write(path, body).await.map_err(to_error)
}
