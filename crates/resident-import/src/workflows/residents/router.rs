use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::io::AsyncWriteExt;

use super::domain::JobId;
use super::service::{ImportServiceError, ResidentImportService};
use super::upload::{UploadError, UploadedFile};
use crate::error::AppError;

pub const ACTOR_HEADER: &str = "x-actor-id";
const FILE_FIELD: &str = "file";
/// Room for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Router builder exposing the resident import endpoints.
pub fn import_router(service: Arc<ResidentImportService>) -> Router {
    let body_limit = service
        .upload_max_bytes()
        .checked_add(MULTIPART_OVERHEAD_BYTES)
        .and_then(|limit| usize::try_from(limit).ok())
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/api/v1/residents/import/preview", post(preview_handler))
        .route("/api/v1/residents/import", post(submit_handler))
        .route(
            "/api/v1/residents/import/jobs/:job_id",
            get(status_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

pub(crate) async fn preview_handler(
    State(service): State<Arc<ResidentImportService>>,
    multipart: Multipart,
) -> Response {
    let upload = match spool_upload(&service, multipart).await {
        Ok(upload) => upload,
        Err(err) => return error_response(err.into()),
    };

    match service.preview(upload).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<ResidentImportService>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let upload = match spool_upload(&service, multipart).await {
        Ok(upload) => upload,
        Err(err) => return error_response(err.into()),
    };

    match service.submit(upload, actor).await {
        Ok(handle) => (StatusCode::ACCEPTED, axum::Json(handle)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<ResidentImportService>>,
    Path(job_id): Path<String>,
) -> Response {
    match service.job_status(&JobId(job_id)).await {
        Ok(status) => (StatusCode::OK, axum::Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: ImportServiceError) -> Response {
    tracing::warn!(error = %err, "import request failed");
    AppError::from(err).into_response()
}

/// Stream the multipart `file` field into a spooled upload, enforcing the size limit.
async fn spool_upload(
    service: &ResidentImportService,
    mut multipart: Multipart,
) -> Result<UploadedFile, UploadError> {
    let limit = service.upload_max_bytes();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let (upload, mut file) = UploadedFile::create_in(service.upload_dir(), original_name).await?;

        let mut written: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| multipart_error(err, limit))?
        {
            written += chunk.len() as u64;
            if written > limit {
                return Err(UploadError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        return Ok(upload);
    }

    Err(UploadError::MissingFile)
}

fn multipart_error(err: MultipartError, limit: u64) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit }
    } else {
        UploadError::Multipart(err.to_string())
    }
}
