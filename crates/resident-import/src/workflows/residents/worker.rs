use std::any::Any;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::artifact::FailureArtifactPublisher;
use super::domain::{FailedRow, JobId, RowIssue};
use super::mapping::CsvRowMapper;
use super::queue::{ImportJob, ImportJobHandler};
use super::reader::RowReader;
use super::repository::{RepositoryError, ResidentRepository};
use super::status::{JobStatus, StatusTracker};
use super::validation::RowValidator;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 50;

/// Final tally of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// True iff no row failed.
    pub success: bool,
    pub processed: u64,
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_file: Option<String>,
    /// Set when a stream fault stopped reading before the end of input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
}

/// Snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProgress {
    pub processed: u64,
    pub failed: u64,
}

pub type ProgressCallback =
    Arc<dyn Fn(ImportProgress) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Streams an uploaded file into the resident store, one row at a time.
///
/// Rows are committed individually; nothing is rolled back when later rows
/// fail. Row problems become [`FailedRow`] entries, never errors.
pub struct ImportWorker {
    residents: Arc<dyn ResidentRepository>,
    status: StatusTracker,
    artifacts: FailureArtifactPublisher,
    validator: RowValidator,
    progress_interval: u64,
    progress: Option<ProgressCallback>,
}

impl ImportWorker {
    pub fn new(
        residents: Arc<dyn ResidentRepository>,
        status: StatusTracker,
        artifacts: FailureArtifactPublisher,
    ) -> Self {
        Self {
            residents,
            status,
            artifacts,
            validator: RowValidator,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress: None,
        }
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub async fn process_file(&self, job_id: &JobId, path: &Path) -> ImportOutcome {
        let pass = RowPass {
            job_id: job_id.clone(),
            path: path.to_path_buf(),
            residents: self.residents.clone(),
            validator: self.validator,
            progress_interval: self.progress_interval,
            progress: self.progress.clone(),
        };

        let tally = match tokio::task::spawn_blocking(move || pass.run()).await {
            Ok(tally) => tally,
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "import row loop aborted");
                return ImportOutcome {
                    success: false,
                    processed: 0,
                    failed: 0,
                    failed_file: None,
                    halted: Some(format!("import aborted: {err}")),
                };
            }
        };

        self.finish(job_id, tally).await
    }

    async fn finish(&self, job_id: &JobId, tally: RowTally) -> ImportOutcome {
        let RowTally {
            processed,
            failures,
            halted,
        } = tally;

        if failures.is_empty() {
            self.status.record(job_id, &JobStatus::success(processed)).await;
            tracing::info!(job_id = %job_id, processed, "import completed without failures");
            return ImportOutcome {
                success: true,
                processed,
                failed: 0,
                failed_file: None,
                halted,
            };
        }

        let failed = failures.len() as u64;
        let reference = self.artifacts.publish(job_id, &failures).await.to_string();
        self.status
            .record(job_id, &JobStatus::failed(processed, failed, reference.clone()))
            .await;
        tracing::info!(
            job_id = %job_id,
            processed,
            failed,
            failed_file = %reference,
            "import completed with failures"
        );

        ImportOutcome {
            success: false,
            processed,
            failed,
            failed_file: Some(reference),
            halted,
        }
    }
}

#[async_trait]
impl ImportJobHandler for ImportWorker {
    async fn handle(&self, job: ImportJob) -> ImportOutcome {
        tracing::info!(
            job_id = %job.id,
            initiated_by = job.initiated_by.as_deref().unwrap_or("anonymous"),
            file = job.upload.original_name().unwrap_or("upload"),
            "processing import job"
        );
        self.process_file(&job.id, job.upload.path()).await
    }
}

#[derive(Debug, Default)]
struct RowTally {
    processed: u64,
    failures: Vec<FailedRow>,
    halted: Option<String>,
}

/// Everything the blocking row loop needs, owned so it can leave the async task.
struct RowPass {
    job_id: JobId,
    path: PathBuf,
    residents: Arc<dyn ResidentRepository>,
    validator: RowValidator,
    progress_interval: u64,
    progress: Option<ProgressCallback>,
}

impl RowPass {
    fn run(self) -> RowTally {
        let mut tally = RowTally::default();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.read_rows(&mut tally))) {
            let reason = panic_message(panic.as_ref());
            tracing::error!(
                job_id = %self.job_id,
                processed = tally.processed,
                error = %reason,
                "import row loop panicked; stopping"
            );
            tally.halted = Some(format!("import aborted: {reason}"));
        }
        tally
    }

    fn read_rows(&self, tally: &mut RowTally) {
        let reader = match RowReader::open(&self.path) {
            Ok(reader) => reader,
            Err(err) => {
                tracing::error!(job_id = %self.job_id, error = %err, "cannot read import file");
                tally.halted = Some(err.to_string());
                return;
            }
        };
        let mapper = CsvRowMapper::from_headers(reader.headers());

        for row in reader {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    tracing::error!(
                        job_id = %self.job_id,
                        processed = tally.processed,
                        error = %err,
                        "import stream fault; stopping"
                    );
                    tally.halted = Some(err.to_string());
                    break;
                }
            };

            tally.processed += 1;
            let candidate = mapper.map(&row);
            let issues = match self.validator.validate(&candidate) {
                Ok(record) => match self.residents.insert(record) {
                    Ok(_) => None,
                    Err(RepositoryError::Conflict { .. }) => Some(vec![RowIssue::field(
                        "nik",
                        "already exists for an active resident",
                    )]),
                    Err(err) => Some(vec![RowIssue::general(err.to_string())]),
                },
                Err(issues) => Some(issues),
            };

            if let Some(issues) = issues {
                tracing::debug!(job_id = %self.job_id, line = row.line_number, "row rejected");
                tally.failures.push(FailedRow::new(row, issues));
            }

            if tally.processed % self.progress_interval == 0 {
                self.report(tally);
            }
        }
    }

    fn report(&self, tally: &RowTally) {
        let Some(callback) = &self.progress else {
            return;
        };
        let progress = ImportProgress {
            processed: tally.processed,
            failed: tally.failures.len() as u64,
        };
        match catch_unwind(AssertUnwindSafe(|| callback(progress))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(job_id = %self.job_id, error = %err, "progress callback failed");
            }
            Err(panic) => tracing::warn!(
                job_id = %self.job_id,
                error = %panic_message(panic.as_ref()),
                "progress callback panicked"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::residents::domain::ResidentRecord;
    use crate::workflows::residents::repository::{InMemoryResidentRepository, StoredResident};
    use crate::workflows::residents::status::{InMemoryJobStatusStore, JobState};
    use std::io::Write;
    use std::sync::Mutex;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write csv");
        file
    }

    fn worker(work_dir: &Path) -> (ImportWorker, InMemoryResidentRepository, StatusTracker) {
        let residents = InMemoryResidentRepository::default();
        let status = StatusTracker::new(Some(Arc::new(InMemoryJobStatusStore::default())));
        let worker = ImportWorker::new(
            Arc::new(residents.clone()),
            status.clone(),
            FailureArtifactPublisher::new(work_dir.to_path_buf(), None),
        );
        (worker, residents, status)
    }

    #[tokio::test]
    async fn failing_rows_do_not_stop_the_job() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (worker, residents, status) = worker(dir.path());
        let file = csv_file(
            "nik,full_name,rt,rw,address\n\
             3201010000010001,Budi,01,02,Jl. A\n\
             123,Siti,01,02,Jl. B\n\
             3201010000010001,Budi Lagi,01,02,Jl. C\n\
             3201010000010002,Ani,01,02,Jl. D\n",
        );
        let job_id = JobId::from("job-rows");

        let outcome = worker.process_file(&job_id, file.path()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.failed, 2);
        assert!(outcome.halted.is_none());
        assert_eq!(residents.len(), 2);

        let recorded = status.lookup(&job_id).await.expect("lookup");
        assert_eq!(recorded.status, JobState::Failed);
        assert_eq!(recorded.failed, 2);
        assert_eq!(recorded.failed_file, outcome.failed_file);
    }

    #[tokio::test]
    async fn missing_file_halts_with_zero_counts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (worker, _, status) = worker(dir.path());
        let job_id = JobId::from("job-missing");

        let outcome = worker
            .process_file(&job_id, &dir.path().join("absent.csv"))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.processed, 0);
        assert!(outcome.halted.is_some());
        assert_eq!(
            status.lookup(&job_id).await.expect("lookup"),
            JobStatus::success(0)
        );
    }

    #[tokio::test]
    async fn progress_is_reported_every_interval_and_errors_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (worker, residents, _) = worker(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let worker = worker
            .with_progress_interval(2)
            .with_progress(Arc::new(
                move |progress: ImportProgress| -> Result<(), Box<dyn Error + Send + Sync>> {
                    sink.lock().expect("progress mutex poisoned").push(progress.processed);
                    Err("listener gone".into())
                },
            ));

        let mut contents = String::from("nik,full_name,rt,rw,address\n");
        for index in 1..=5 {
            contents.push_str(&format!("32010100000100{index:02},Warga {index},01,02,Jl. A\n"));
        }
        let file = csv_file(&contents);

        let outcome = worker.process_file(&JobId::from("job-progress"), file.path()).await;
        assert!(outcome.success);
        assert_eq!(outcome.processed, 5);
        assert_eq!(residents.len(), 5);
        assert_eq!(*seen.lock().expect("progress mutex poisoned"), vec![2, 4]);
    }

    #[tokio::test]
    async fn panicking_progress_callback_is_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (worker, residents, status) = worker(dir.path());
        let worker = worker.with_progress_interval(2).with_progress(Arc::new(
            |_: ImportProgress| -> Result<(), Box<dyn Error + Send + Sync>> {
                panic!("listener exploded")
            },
        ));

        let mut contents = String::from("nik,full_name,rt,rw,address\n");
        for index in 1..=5 {
            contents.push_str(&format!("32010100000100{index:02},Warga {index},01,02,Jl. A\n"));
        }
        let file = csv_file(&contents);
        let job_id = JobId::from("job-panicky-progress");

        let outcome = worker.process_file(&job_id, file.path()).await;
        assert!(outcome.success);
        assert_eq!(outcome.processed, 5);
        assert!(outcome.halted.is_none());
        assert_eq!(residents.len(), 5);
        assert_eq!(
            status.lookup(&job_id).await.expect("lookup"),
            JobStatus::success(5)
        );
    }

    struct PanickingRepository;

    impl ResidentRepository for PanickingRepository {
        fn insert(&self, _record: ResidentRecord) -> Result<StoredResident, RepositoryError> {
            panic!("store exploded")
        }

        fn find_by_nik(&self, _nik: &str) -> Result<Option<StoredResident>, RepositoryError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn panic_in_row_loop_keeps_counts_gathered_so_far() {
        let dir = tempfile::tempdir().expect("temp dir");
        let status = StatusTracker::new(Some(Arc::new(InMemoryJobStatusStore::default())));
        let worker = ImportWorker::new(
            Arc::new(PanickingRepository),
            status.clone(),
            FailureArtifactPublisher::new(dir.path().to_path_buf(), None),
        );
        let file = csv_file(
            "nik,full_name,rt,rw,address\n\
             123,Siti,01,02,Jl. B\n\
             3201010000010001,Budi,01,02,Jl. A\n",
        );
        let job_id = JobId::from("job-store-panic");

        let outcome = worker.process_file(&job_id, file.path()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 1);
        assert!(outcome
            .halted
            .as_deref()
            .is_some_and(|reason| reason.contains("store exploded")));

        let recorded = status.lookup(&job_id).await.expect("lookup");
        assert_eq!(recorded.status, JobState::Failed);
        assert_eq!(recorded.processed, 2);
    }

    #[tokio::test]
    async fn malformed_bytes_halt_but_keep_committed_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (worker, residents, _) = worker(dir.path());
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"nik,full_name,rt,rw,address\n3201010000010001,Budi,01,02,Jl. A\n")
            .expect("write");
        file.write_all(b"3201010000010002,\xff\xfe,01,02,Jl. B\n").expect("write");

        let outcome = worker.process_file(&JobId::from("job-fault"), file.path()).await;
        assert_eq!(outcome.processed, 1);
        assert!(outcome.halted.is_some());
        assert_eq!(residents.len(), 1);
    }
}
