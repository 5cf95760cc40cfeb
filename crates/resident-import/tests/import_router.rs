use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use resident_import::workflows::residents::{
    import_router, FailureArtifactPublisher, ImportJobQueue, ImportWorker,
    InMemoryJobStatusStore, InMemoryResidentRepository, InlineImportQueue, PreviewValidator,
    ResidentImportService, ResidentRepository, StatusTracker,
};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "X-RESIDENT-BOUNDARY";

const UPLOAD_LIMIT: u64 = 64 * 1024;

fn multipart_body(field: &str, contents: &str) -> Body {
    Body::from(format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"residents.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    ))
}

fn upload_request(uri: &str, field: &str, contents: &str) -> Request<Body> {
    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-actor-id", "rt-admin")
        .body(multipart_body(field, contents))
        .expect("request")
}

struct TestApp {
    router: axum::Router,
    residents: InMemoryResidentRepository,
    upload_dir: tempfile::TempDir,
    _work_dir: tempfile::TempDir,
}

fn app(status_configured: bool) -> TestApp {
    let upload_dir = tempfile::tempdir().expect("upload dir");
    let work_dir = tempfile::tempdir().expect("work dir");
    let residents = InMemoryResidentRepository::default();
    let status = if status_configured {
        StatusTracker::new(Some(Arc::new(InMemoryJobStatusStore::default())))
    } else {
        StatusTracker::disabled()
    };

    let worker = ImportWorker::new(
        Arc::new(residents.clone()),
        status.clone(),
        FailureArtifactPublisher::new(work_dir.path().to_path_buf(), None),
    );
    let queue = Arc::new(InlineImportQueue::new());
    queue.register_worker(Arc::new(worker)).expect("register");

    let service = ResidentImportService::new(
        queue,
        status,
        PreviewValidator::new(100),
        upload_dir.path().to_path_buf(),
    )
    .with_upload_limit(UPLOAD_LIMIT);

    TestApp {
        router: import_router(Arc::new(service)),
        residents,
        upload_dir,
        _work_dir: work_dir,
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

fn upload_dir_is_empty(app: &TestApp) -> bool {
    std::fs::read_dir(app.upload_dir.path())
        .expect("read upload dir")
        .next()
        .is_none()
}

const CSV: &str = "nik,full_name,rt,rw,address\n\
                   3201010000010001,Budi,01,02,Jl. A\n\
                   12,Siti,01,02,Jl. B";

#[tokio::test]
async fn preview_returns_row_report_and_cleans_up() {
    let app = app(true);
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/residents/import/preview", "file", CSV))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_rows"], 2);
    assert_eq!(body["valid_count"], 1);
    assert_eq!(body["invalid_count"], 1);
    assert_eq!(body["errors"][0]["row"], 3);
    assert_eq!(body["errors"][0]["errors"][0]["field"], "nik");
    assert!(app.residents.is_empty());
    assert!(upload_dir_is_empty(&app));
}

#[tokio::test]
async fn submit_accepts_and_status_is_pollable() {
    let app = app(true);
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/residents/import", "file", CSV))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    let job_id = body["jobId"].as_str().expect("job id").to_string();
    assert_eq!(body["result"]["processed"], 2);
    assert_eq!(body["result"]["failed"], 1);
    assert_eq!(app.residents.len(), 1);
    assert!(app
        .residents
        .find_by_nik("3201010000010001")
        .expect("lookup")
        .is_some());
    assert!(upload_dir_is_empty(&app));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/residents/import/jobs/{job_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let status = json_body(response).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(status["processed"], 2);
    assert_eq!(status["failed"], 1);
    assert!(status["failedFile"].is_string());
}

#[tokio::test]
async fn status_reports_pending_and_unknown() {
    let request = || {
        Request::get("/api/v1/residents/import/jobs/never-submitted")
            .body(Body::empty())
            .expect("request")
    };

    let response = app(true).router.oneshot(request()).await.expect("response");
    assert_eq!(json_body(response).await["status"], "pending");

    let response = app(false).router.oneshot(request()).await.expect("response");
    assert_eq!(json_body(response).await["status"], "unknown");
}

#[tokio::test]
async fn missing_file_field_is_a_bad_request() {
    let app = app(true);
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/residents/import", "attachment", CSV))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "no file was uploaded");
    assert!(app.residents.is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let mut contents = String::from("nik,full_name,rt,rw,address\n");
    while (contents.len() as u64) <= UPLOAD_LIMIT * 3 {
        contents.push_str("3201010000010001,Budi,01,02,Jl. A\n");
    }

    for uri in ["/api/v1/residents/import/preview", "/api/v1/residents/import"] {
        let app = app(true);
        let response = app
            .router
            .clone()
            .oneshot(upload_request(uri, "file", &contents))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            json_body(response).await["error"],
            format!("upload exceeds {UPLOAD_LIMIT} bytes")
        );
        assert!(app.residents.is_empty());
        assert!(upload_dir_is_empty(&app));
    }
}

#[tokio::test]
async fn upload_just_over_the_limit_is_rejected_with_413() {
    let mut contents = String::from("nik,full_name,rt,rw,address\n");
    while (contents.len() as u64) <= UPLOAD_LIMIT {
        contents.push('x');
    }

    let app = app(true);
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/residents/import/preview", "file", &contents))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(upload_dir_is_empty(&app));
}
