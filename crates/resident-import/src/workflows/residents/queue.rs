use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::domain::JobId;
use super::upload::UploadedFile;
use super::worker::ImportOutcome;

/// A submitted import request. The upload guard rides along, so the spooled
/// file lives exactly as long as the job.
#[derive(Debug)]
pub struct ImportJob {
    pub id: JobId,
    pub upload: UploadedFile,
    pub initiated_by: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(upload: UploadedFile, initiated_by: Option<String>) -> Self {
        Self {
            id: JobId::generate(),
            upload,
            initiated_by,
            submitted_at: Utc::now(),
        }
    }
}

/// The single processing function bound to a queue.
#[async_trait]
pub trait ImportJobHandler: Send + Sync {
    async fn handle(&self, job: ImportJob) -> ImportOutcome;
}

/// Returned from `submit`. `result` and `error` are only filled by queues
/// that run the job before returning.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("import queue is closed")]
    Closed,
    #[error("a worker is already registered on this queue")]
    WorkerAlreadyRegistered,
    #[error("registering a background worker requires a tokio runtime")]
    NoRuntime,
}

/// Dispatches jobs to exactly one registered handler in submission order.
#[async_trait]
pub trait ImportJobQueue: Send + Sync {
    async fn submit(&self, job: ImportJob) -> Result<JobHandle, QueueError>;
    fn register_worker(&self, handler: Arc<dyn ImportJobHandler>) -> Result<(), QueueError>;
    /// Stop accepting jobs and wait for accepted ones to finish.
    async fn shutdown(&self);
}

/// Queue backed by an mpsc channel with a single consumer task.
pub struct BackgroundImportQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<ImportJob>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ImportJob>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BackgroundImportQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundImportQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            consumer: Mutex::new(None),
        }
    }
}

async fn consume(
    mut receiver: mpsc::UnboundedReceiver<ImportJob>,
    handler: Arc<dyn ImportJobHandler>,
) {
    while let Some(job) = receiver.recv().await {
        let job_id = job.id.clone();
        tracing::info!(job_id = %job_id, "dispatching import job");

        let handler = handler.clone();
        match tokio::spawn(async move { handler.handle(job).await }).await {
            Ok(outcome) => tracing::info!(
                job_id = %job_id,
                success = outcome.success,
                processed = outcome.processed,
                failed = outcome.failed,
                "import job finished"
            ),
            Err(err) => tracing::error!(job_id = %job_id, error = %err, "import job aborted"),
        }
    }
    tracing::debug!("import queue drained");
}

#[async_trait]
impl ImportJobQueue for BackgroundImportQueue {
    async fn submit(&self, job: ImportJob) -> Result<JobHandle, QueueError> {
        let job_id = job.id.clone();
        {
            let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = guard.as_ref().ok_or(QueueError::Closed)?;
            sender.send(job).map_err(|_| QueueError::Closed)?;
        }
        tracing::info!(job_id = %job_id, "import job enqueued");

        Ok(JobHandle {
            job_id,
            result: None,
            error: None,
        })
    }

    fn register_worker(&self, handler: Arc<dyn ImportJobHandler>) -> Result<(), QueueError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(QueueError::WorkerAlreadyRegistered)?;

        let task = runtime.spawn(consume(receiver, handler));
        *self.consumer.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = consumer {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "import queue consumer terminated abnormally");
            }
        }
    }
}

/// Runs the handler to completion inside `submit`, for isolated tests and the CLI.
#[derive(Default)]
pub struct InlineImportQueue {
    handler: Mutex<Option<Arc<dyn ImportJobHandler>>>,
    closed: AtomicBool,
}

impl InlineImportQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImportJobQueue for InlineImportQueue {
    async fn submit(&self, job: ImportJob) -> Result<JobHandle, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let job_id = job.id.clone();
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(handler) = handler else {
            tracing::warn!(job_id = %job_id, "no import worker registered; job dropped");
            return Ok(JobHandle {
                job_id,
                result: None,
                error: None,
            });
        };

        match tokio::spawn(async move { handler.handle(job).await }).await {
            Ok(outcome) => Ok(JobHandle {
                job_id,
                result: Some(outcome),
                error: None,
            }),
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "import job aborted");
                Ok(JobHandle {
                    job_id,
                    result: None,
                    error: Some(format!("import job aborted: {err}")),
                })
            }
        }
    }

    fn register_worker(&self, handler: Arc<dyn ImportJobHandler>) -> Result<(), QueueError> {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(QueueError::WorkerAlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
