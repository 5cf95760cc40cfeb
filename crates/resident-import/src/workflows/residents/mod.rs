//! Bulk CSV import of resident identity records.
//!
//! Uploads are mapped to canonical fields, validated row by row, and either
//! previewed (nothing committed) or queued for import. Import jobs commit each
//! valid row on its own, collect the rest into a failure artifact, and record a
//! durable status that clients poll by job id.

pub mod artifact;
pub mod domain;
pub mod mapping;
mod normalizer;
pub mod preview;
pub mod queue;
pub mod reader;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod upload;
pub mod validation;
pub mod worker;

pub use artifact::{
    ArtifactError, ArtifactReference, ArtifactStorage, FailureArtifactPublisher, FailureEntry,
    S3ArtifactStorage,
};
pub use domain::{FailedRow, JobId, RawRow, ResidenceStatus, ResidentRecord, RowIssue};
pub use mapping::{CandidateRecord, CanonicalField, CsvRowMapper};
pub use preview::{PreviewError, PreviewReport, PreviewRowError, PreviewValidator};
pub use queue::{
    BackgroundImportQueue, ImportJob, ImportJobHandler, ImportJobQueue, InlineImportQueue,
    JobHandle, QueueError,
};
pub use reader::{ImportError, RowReader};
pub use repository::{
    InMemoryResidentRepository, RepositoryError, ResidentRepository, StoredResident,
};
pub use router::import_router;
pub use service::{ImportServiceError, ResidentImportService};
pub use status::{
    InMemoryJobStatusStore, JobState, JobStatus, JobStatusStore, RedisJobStatusStore,
    StatusStoreError, StatusTracker,
};
pub use upload::{UploadError, UploadedFile};
pub use validation::RowValidator;
pub use worker::{ImportOutcome, ImportProgress, ImportWorker, ProgressCallback};
