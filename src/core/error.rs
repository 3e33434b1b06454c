use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::conversion::ConversionError;
use crate::core::validation::ValidationError;
use crate::storage::uploads::ObjectStoreError;
use crate::storage::StoreError;

/// Centralized error types for the application
///
/// Every failure on the request path ends up here and is rendered as a
/// `{"error": "<message>"}` body. The HTTP status comes from
/// [`AppError::status_code`]; anything that is not a client mistake,
/// a rate-limit hit or a CORS rejection is a 500.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed request input
    #[error("{0}")]
    InvalidRequest(String),

    /// `format` is something other than mp4/mp3
    #[error("Unsupported format")]
    UnsupportedFormat(String),

    /// The extractor returned nothing usable
    #[error("No media found for the provided URL")]
    NoMediaFound,

    /// The extractor itself failed (binary missing, timeout, bad output)
    #[error("{0}")]
    ExtractionFailed(String),

    /// Cache / counter store could not be reached
    #[error("{0}")]
    StoreUnavailable(#[from] StoreError),

    /// Fetching the source media to a temp file failed
    #[error("{0}")]
    DownloadFailed(String),

    /// ffmpeg failed
    #[error("{0}")]
    TranscodeFailed(#[from] ConversionError),

    /// Object store upload failed. The underlying error is logged where it
    /// happens; clients only see the generic message.
    #[error("Failed to upload file to Cloudinary")]
    UploadFailed(#[from] ObjectStoreError),

    /// Per-IP request ceiling reached
    #[error("Too many requests, please try again later")]
    RateLimited { retry_after: Duration },

    /// Request came from an origin outside the allow-list
    #[error("Not allowed by CORS")]
    CorsRejected(String),

    /// Startup configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A background pipeline task panicked or was aborted
    #[error("Internal server error")]
    Task(#[from] tokio::task::JoinError),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::CorsRejected(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::NoMediaFound => "no_media",
            AppError::ExtractionFailed(_) => "extraction",
            AppError::StoreUnavailable(_) => "store",
            AppError::DownloadFailed(_) => "download",
            AppError::TranscodeFailed(_) => "transcode",
            AppError::UploadFailed(_) => "upload",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::CorsRejected(_) => "cors",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Task(_) => "task",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnsupportedFormat(format) => AppError::UnsupportedFormat(format),
            other => AppError::InvalidRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed [{}]: {}", self.category(), self);
        } else {
            log::warn!("Request rejected [{}]: {}", self.category(), self);
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let AppError::RateLimited { retry_after } = self {
            // Round up so clients never retry a second early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
