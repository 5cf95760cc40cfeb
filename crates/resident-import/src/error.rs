use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::residents::{
    ImportServiceError, PreviewError, QueueError, RepositoryError, UploadError,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Storage(RepositoryError),
    Import(ImportServiceError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Import(ImportServiceError::Upload(UploadError::TooLarge { .. })) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Import(ImportServiceError::Upload(
                UploadError::MissingFile | UploadError::Multipart(_),
            )) => StatusCode::BAD_REQUEST,
            AppError::Import(ImportServiceError::Queue(QueueError::Closed)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Storage(_)
            | AppError::Import(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to API clients.
    fn public_message(&self) -> String {
        match self {
            AppError::Import(ImportServiceError::Upload(UploadError::Io(_))) => {
                "failed to store upload".to_string()
            }
            AppError::Import(ImportServiceError::Upload(err)) => err.to_string(),
            AppError::Import(ImportServiceError::Preview(PreviewError::Read(_))) => {
                "failed to parse CSV".to_string()
            }
            AppError::Import(ImportServiceError::Status(_)) => {
                "failed to read job status".to_string()
            }
            AppError::Import(ImportServiceError::Queue(err)) => err.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Storage(err) => write!(f, "storage error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Import(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Storage(value)
    }
}

impl From<ImportServiceError> for AppError {
    fn from(value: ImportServiceError) -> Self {
        Self::Import(value)
    }
}

impl From<PreviewError> for AppError {
    fn from(value: PreviewError) -> Self {
        Self::Import(value.into())
    }
}
