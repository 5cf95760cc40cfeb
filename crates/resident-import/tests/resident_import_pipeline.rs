use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use resident_import::storage::SqliteResidentRepository;
use resident_import::workflows::residents::{
    BackgroundImportQueue, FailureArtifactPublisher, FailureEntry, ImportJob, ImportJobQueue,
    ImportWorker, InMemoryJobStatusStore, InMemoryResidentRepository, InlineImportQueue, JobId,
    JobState, JobStatus, PreviewValidator, ResidentRepository, RowReader, StatusTracker,
    UploadedFile,
};

const HEADER: &str = "nik,kk_number,full_name,rt_number,rw_number,address,residence_status\n";

fn csv_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create csv");
    file.write_all(contents.as_bytes()).expect("write csv");
    path
}

struct Harness {
    residents: Arc<dyn ResidentRepository>,
    status: StatusTracker,
    worker: ImportWorker,
    work_dir: tempfile::TempDir,
}

fn harness(residents: Arc<dyn ResidentRepository>) -> Harness {
    let work_dir = tempfile::tempdir().expect("work dir");
    let status = StatusTracker::new(Some(Arc::new(InMemoryJobStatusStore::default())));
    let worker = ImportWorker::new(
        residents.clone(),
        status.clone(),
        FailureArtifactPublisher::new(work_dir.path().to_path_buf(), None),
    );
    Harness {
        residents,
        status,
        worker,
        work_dir,
    }
}

#[tokio::test]
async fn two_valid_rows_are_committed() {
    let h = harness(Arc::new(InMemoryResidentRepository::default()));
    let file = csv_file(
        h.work_dir.path(),
        "valid.csv",
        &format!(
            "{HEADER}3201010000010001,3201010000010000,Budi Santoso,01,02,Jl. Merdeka 1,owner\n\
             3201010000010002,,Siti Aminah,01,02,Jl. Merdeka 2,tenant\n"
        ),
    );
    let job_id = JobId::from("scenario-a");

    let outcome = h.worker.process_file(&job_id, &file).await;
    assert!(outcome.success);
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.failed_file.is_none());

    for nik in ["3201010000010001", "3201010000010002"] {
        assert!(h.residents.find_by_nik(nik).expect("lookup").is_some());
    }
    assert_eq!(
        h.status.lookup(&job_id).await.expect("lookup"),
        JobStatus::success(2)
    );
}

#[tokio::test]
async fn existing_nik_becomes_a_row_failure_with_artifact() {
    let residents = Arc::new(SqliteResidentRepository::open_in_memory().expect("sqlite"));
    let h = harness(residents);
    let seed = csv_file(
        h.work_dir.path(),
        "seed.csv",
        &format!("{HEADER}3201010000010001,,Budi Santoso,01,02,Jl. Merdeka 1,\n"),
    );
    assert!(h.worker.process_file(&JobId::from("seed"), &seed).await.success);

    let duplicate = csv_file(
        h.work_dir.path(),
        "duplicate.csv",
        &format!("{HEADER}3201010000010001,,Budi Kembar,03,04,Jl. Lain 9,owner\n"),
    );
    let job_id = JobId::from("scenario-b");
    let outcome = h.worker.process_file(&job_id, &duplicate).await;

    assert!(!outcome.success);
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 1);
    let failed_file = outcome.failed_file.clone().expect("artifact reference");

    let stored = h
        .residents
        .find_by_nik("3201010000010001")
        .expect("lookup")
        .expect("original resident");
    assert_eq!(stored.record.full_name, "Budi Santoso");

    let entries: Vec<FailureEntry> =
        serde_json::from_slice(&std::fs::read(&failed_file).expect("artifact on disk"))
            .expect("artifact json");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record["full_name"], "Budi Kembar");
    assert!(entries[0].error.contains("already exists"));

    let status = h.status.lookup(&job_id).await.expect("lookup");
    assert_eq!(status.status, JobState::Failed);
    assert_eq!(status.failed_file.as_deref(), Some(failed_file.as_str()));
}

#[tokio::test]
async fn reimport_reports_duplicates_and_reevaluates_other_failures() {
    let h = harness(Arc::new(InMemoryResidentRepository::default()));
    let file = csv_file(
        h.work_dir.path(),
        "mixed.csv",
        &format!(
            "{HEADER}3201010000010001,,Budi Santoso,01,02,Jl. Merdeka 1,owner\n\
             12345,,Siti Aminah,01,02,Jl. Merdeka 2,owner\n"
        ),
    );

    let first = h.worker.process_file(&JobId::from("first"), &file).await;
    assert_eq!((first.processed, first.failed), (2, 1));

    let second = h.worker.process_file(&JobId::from("second"), &file).await;
    assert_eq!((second.processed, second.failed), (2, 2));

    let read = |outcome: &resident_import::workflows::residents::ImportOutcome| {
        let path = outcome.failed_file.clone().expect("artifact");
        serde_json::from_slice::<Vec<FailureEntry>>(&std::fs::read(path).expect("artifact"))
            .expect("json")
    };
    let first_entries = read(&first);
    let second_entries = read(&second);

    assert_eq!(second_entries[0].error, "nik already exists for an active resident");
    assert_eq!(second_entries[1], first_entries[0]);
}

#[tokio::test]
async fn missing_required_field_is_reported_by_name() {
    let h = harness(Arc::new(InMemoryResidentRepository::default()));
    let file = csv_file(
        h.work_dir.path(),
        "no-address.csv",
        "nik,full_name,rt,rw\n3201010000010001,Budi,01,02\n",
    );

    let outcome = h.worker.process_file(&JobId::from("no-address"), &file).await;
    assert_eq!(outcome.failed, 1);
    assert!(h
        .residents
        .find_by_nik("3201010000010001")
        .expect("lookup")
        .is_none());

    let entries: Vec<FailureEntry> = serde_json::from_slice(
        &std::fs::read(outcome.failed_file.expect("artifact")).expect("artifact"),
    )
    .expect("json");
    assert_eq!(entries[0].error, "address is required");
}

#[test]
fn preview_counts_without_committing() {
    let csv = format!(
        "{HEADER}3201010000010001,,Budi,01,02,Jl. A,owner\n\
         3201010000010002,,Siti,01,02,Jl. B,tenant\n\
         3201010000010003,,Ani,01,02,Jl. C,boarding\n\
         320101000001000X,,Dewi,01,02,Jl. D,owner\n\
         3201010000010005,,,01,02,Jl. E,owner\n"
    );
    let reader = RowReader::from_reader(Cursor::new(csv)).expect("headers");
    let report = PreviewValidator::default()
        .preview_reader(reader)
        .expect("preview");

    assert_eq!(report.total_rows, 5);
    assert_eq!(report.valid_count, 3);
    assert_eq!(report.invalid_count, 2);
    assert_eq!(report.errors.len(), 2);
}

#[test]
fn header_synonyms_yield_identical_outcomes() {
    let body = "3201010000010001,Budi,01,02,Jl. A\n12,Siti,01,02,Jl. B\n";
    let report_for = |header: &str| {
        let reader = RowReader::from_reader(Cursor::new(format!("{header}\n{body}")))
            .expect("headers");
        PreviewValidator::default()
            .preview_reader(reader)
            .expect("preview")
    };

    let upper = report_for("NIK,Name,RT,RW,address");
    let long = report_for("nik_number,full_name,rt_number,rw_number,address");

    assert_eq!(upper.valid_count, long.valid_count);
    assert_eq!(upper.invalid_count, long.invalid_count);
    assert_eq!(upper.errors[0].errors, long.errors[0].errors);
}

#[test]
fn row_limit_flags_only_the_boundary_row() {
    let mut csv = String::from(HEADER);
    for index in 1..=4 {
        csv.push_str(&format!("32010100000100{index:02},,Warga,01,02,Jl. A,owner\n"));
    }
    let reader = RowReader::from_reader(Cursor::new(csv)).expect("headers");
    let report = PreviewValidator::new(3)
        .preview_reader(reader)
        .expect("preview");

    assert_eq!(report.valid_count, 3);
    assert_eq!(report.invalid_count, 1);
    assert_eq!(report.errors[0].row, 5);
    assert_eq!(report.errors[0].errors[0].message, "row limit exceeded, max 3");
}

#[tokio::test]
async fn inline_and_background_queues_agree_on_status() {
    let dir = tempfile::tempdir().expect("temp dir");
    let contents = format!("{HEADER}3201010000010001,,Budi,01,02,Jl. A,owner\n");

    let inline = InlineImportQueue::new();
    let h = harness(Arc::new(InMemoryResidentRepository::default()));
    let inline_status = h.status.clone();
    inline.register_worker(Arc::new(h.worker)).expect("register");
    let path = csv_file(dir.path(), "inline.csv", &contents);
    let handle = inline
        .submit(ImportJob::new(UploadedFile::adopt(path.clone(), None), None))
        .await
        .expect("submit");
    assert!(handle.result.expect("inline result").success);
    assert!(!path.exists());
    assert_eq!(
        inline_status.lookup(&handle.job_id).await.expect("lookup"),
        JobStatus::success(1)
    );

    let background = BackgroundImportQueue::new();
    let h = harness(Arc::new(InMemoryResidentRepository::default()));
    let background_status = h.status.clone();
    background
        .register_worker(Arc::new(h.worker))
        .expect("register");
    let path = csv_file(dir.path(), "background.csv", &contents);
    let handle = background
        .submit(ImportJob::new(UploadedFile::adopt(path.clone(), None), Some("rt-01".into())))
        .await
        .expect("submit");
    assert!(handle.result.is_none());

    let mut status = background_status
        .lookup(&handle.job_id)
        .await
        .expect("lookup");
    for _ in 0..100 {
        if status.status != JobState::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = background_status
            .lookup(&handle.job_id)
            .await
            .expect("lookup");
    }
    assert_eq!(status, JobStatus::success(1));

    background.shutdown().await;
    assert!(!path.exists());
}
