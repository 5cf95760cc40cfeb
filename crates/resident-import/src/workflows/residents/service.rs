use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::domain::JobId;
use super::preview::{PreviewError, PreviewReport, PreviewValidator};
use super::queue::{ImportJob, ImportJobQueue, JobHandle, QueueError};
use super::status::{JobStatus, StatusStoreError, StatusTracker};
use super::upload::{UploadError, UploadedFile};

/// Entry point for the import API: preview, submit, and status polling.
pub struct ResidentImportService {
    queue: Arc<dyn ImportJobQueue>,
    status: StatusTracker,
    preview: PreviewValidator,
    upload_dir: PathBuf,
    upload_max_bytes: u64,
}

impl ResidentImportService {
    pub fn new(
        queue: Arc<dyn ImportJobQueue>,
        status: StatusTracker,
        preview: PreviewValidator,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            queue,
            status,
            preview,
            upload_dir,
            upload_max_bytes: u64::MAX,
        }
    }

    pub fn with_upload_limit(mut self, max_bytes: u64) -> Self {
        self.upload_max_bytes = max_bytes;
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn upload_max_bytes(&self) -> u64 {
        self.upload_max_bytes
    }

    pub async fn preview(&self, upload: UploadedFile) -> Result<PreviewReport, ImportServiceError> {
        Ok(self.preview.preview_upload(upload).await?)
    }

    /// Hand the upload to the queue; ownership of the file moves with the job.
    pub async fn submit(
        &self,
        upload: UploadedFile,
        initiated_by: Option<String>,
    ) -> Result<JobHandle, ImportServiceError> {
        let job = ImportJob::new(upload, initiated_by);
        Ok(self.queue.submit(job).await?)
    }

    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatus, ImportServiceError> {
        Ok(self.status.lookup(job_id).await?)
    }
}

/// Error raised by the import service.
#[derive(Debug, thiserror::Error)]
pub enum ImportServiceError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Status(#[from] StatusStoreError),
}
