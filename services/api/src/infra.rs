use metrics_exporter_prometheus::PrometheusHandle;
use resident_import::config::{AppConfig, QueueMode};
use resident_import::error::AppError;
use resident_import::storage::SqliteResidentRepository;
use resident_import::workflows::residents::{
    ArtifactStorage, BackgroundImportQueue, FailureArtifactPublisher, ImportJobQueue,
    ImportProgress, ImportServiceError, ImportWorker, InMemoryResidentRepository,
    InlineImportQueue, JobStatusStore, PreviewValidator, RedisJobStatusStore,
    ResidentImportService, ResidentRepository, S3ArtifactStorage, StatusTracker,
};
use std::error::Error;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type ProgressError = Box<dyn Error + Send + Sync>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Concrete capabilities wired from configuration.
pub(crate) struct ImportPipeline {
    pub(crate) service: Arc<ResidentImportService>,
    pub(crate) queue: Arc<dyn ImportJobQueue>,
    pub(crate) worker: Arc<ImportWorker>,
}

pub(crate) async fn build_pipeline(config: &AppConfig) -> Result<ImportPipeline, AppError> {
    let residents = resident_repository(config)?;
    let status = StatusTracker::new(status_store(config).await);
    let artifacts =
        FailureArtifactPublisher::new(config.import.work_dir.clone(), artifact_storage(config).await);

    let worker = Arc::new(
        ImportWorker::new(residents, status.clone(), artifacts)
            .with_progress_interval(config.import.progress_interval)
            .with_progress(Arc::new(|progress: ImportProgress| -> Result<(), ProgressError> {
                debug!(
                    processed = progress.processed,
                    failed = progress.failed,
                    "import progress"
                );
                Ok(())
            })),
    );

    let queue: Arc<dyn ImportJobQueue> = match config.import.queue_mode {
        QueueMode::Background => Arc::new(BackgroundImportQueue::new()),
        QueueMode::Inline => Arc::new(InlineImportQueue::new()),
    };
    queue
        .register_worker(worker.clone())
        .map_err(ImportServiceError::from)?;

    let service = ResidentImportService::new(
        queue.clone(),
        status,
        PreviewValidator::new(config.import.max_rows),
        config.import.upload_dir.clone(),
    )
    .with_upload_limit(config.import.upload_max_bytes);

    info!(
        queue_mode = ?config.import.queue_mode,
        max_rows = config.import.max_rows,
        "import pipeline ready"
    );

    Ok(ImportPipeline {
        service: Arc::new(service),
        queue,
        worker,
    })
}

fn resident_repository(config: &AppConfig) -> Result<Arc<dyn ResidentRepository>, AppError> {
    match &config.database_path {
        Some(path) => {
            let repository = SqliteResidentRepository::open(path)?;
            info!(path = %path.display(), "using sqlite resident store");
            Ok(Arc::new(repository))
        }
        None => {
            warn!("DATABASE_PATH not set; residents are kept in memory");
            Ok(Arc::new(InMemoryResidentRepository::default()))
        }
    }
}

async fn status_store(config: &AppConfig) -> Option<Arc<dyn JobStatusStore>> {
    let Some(store) = &config.status_store else {
        warn!("REDIS_URL not set; job status will not be persisted");
        return None;
    };

    match RedisJobStatusStore::connect(&store.url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            error!(error = %err, "status store unavailable; job status will not be persisted");
            None
        }
    }
}

async fn artifact_storage(config: &AppConfig) -> Option<Arc<dyn ArtifactStorage>> {
    let storage = config.artifact_storage.as_ref()?;
    info!(bucket = %storage.bucket, "failure artifacts will be uploaded");
    Some(Arc::new(S3ArtifactStorage::from_config(storage).await))
}
