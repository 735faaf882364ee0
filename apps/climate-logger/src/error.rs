use crate::ingest::IngestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt::Display;

/// Plain-text failure response. The body always starts with `Error: ` so the
/// device can tell failure from success without parsing status codes.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn storage(err: impl Display) -> Self {
        tracing::error!(error = %err, "reading log unavailable");
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Failed to access reading log")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, format!("Error: {}", self.message)).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Rejected { .. } => Self::bad_request(err.to_string()),
            // Already logged with full detail by the ingest path.
            IngestError::StorageFailure(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Failed to store reading")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
