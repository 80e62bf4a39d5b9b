//! Error types and handling for the gateway.
//!
//! [`UpstreamError`] is the taxonomy of failures talking to the model
//! server; the retry executor pattern-matches on it. [`AppError`] wraps it
//! together with inbound failures and converts to an HTTP response.

use crate::core::error_types::{
    UpstreamErrorKind, CIRCUIT_OPEN_DETAILS, ERROR_CALENDAR_NOT_FOUND, ERROR_FILE_NOT_FOUND,
    ERROR_INTERNAL,
    ERROR_INVALID_REQUEST, ERROR_SERVICE_UNAVAILABLE, ERROR_UNAUTHORIZED, ERROR_UNKNOWN_MODEL,
    ERROR_UPLOAD_FAILED, ERROR_UPSTREAM, ERROR_UPSTREAM_TIMEOUT,
};
use crate::services::document_store::DocumentError;
use crate::services::scheduling::SchedulingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failure of a logical upstream call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// Breaker is rejecting calls; no network request was made
    #[error("circuit open")]
    CircuitOpen,

    /// Attempt exceeded the per-attempt timeout
    #[error("upstream timeout: {0}")]
    Timeout(String),

    /// Connection-level failure
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body: String },

    /// Body was not the JSON we expected
    #[error("upstream decode error: {0}")]
    Decode(String),

    /// Non-streaming path invoked with `stream = true`
    #[error("stream requests must use the streaming call path")]
    StreamMisuse,
}

impl UpstreamError {
    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            Self::CircuitOpen => UpstreamErrorKind::CircuitOpen,
            Self::Timeout(_) => UpstreamErrorKind::Timeout,
            Self::Transport(_) => UpstreamErrorKind::Transport,
            Self::Http { .. } => UpstreamErrorKind::Http,
            Self::Decode(_) => UpstreamErrorKind::Decode,
            Self::StreamMisuse => UpstreamErrorKind::StreamMisuse,
        }
    }

    /// Transient failures the retry executor may re-attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Upstream HTTP status, when the failure carried one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Status code and body the gateway reports for this failure.
    pub fn to_error_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::CircuitOpen => ErrorBody::with_details(
                StatusCode::SERVICE_UNAVAILABLE,
                ERROR_SERVICE_UNAVAILABLE,
                CIRCUIT_OPEN_DETAILS,
            ),
            Self::Timeout(detail) => ErrorBody::with_details(
                StatusCode::GATEWAY_TIMEOUT,
                ERROR_UPSTREAM_TIMEOUT,
                detail.clone(),
            ),
            Self::Http { status: 400, .. } => {
                ErrorBody::new(StatusCode::BAD_REQUEST, ERROR_UNKNOWN_MODEL)
            }
            Self::Http {
                status: 401 | 403, ..
            } => ErrorBody::new(StatusCode::UNAUTHORIZED, ERROR_UNAUTHORIZED),
            Self::Http { status, .. } => ErrorBody::with_details(
                StatusCode::BAD_GATEWAY,
                ERROR_UPSTREAM,
                format!("upstream_status={}", status),
            ),
            Self::Transport(detail) | Self::Decode(detail) => {
                ErrorBody::with_details(StatusCode::BAD_GATEWAY, ERROR_UPSTREAM, detail.clone())
            }
            Self::StreamMisuse => ErrorBody::with_details(
                StatusCode::INTERNAL_SERVER_ERROR,
                ERROR_INTERNAL,
                self.to_string(),
            ),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Http {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Structured error body returned to gateway clients, both as a JSON
/// response and as an inline SSE event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "service_unavailable",
    "details": "The upstream model server is temporarily unavailable. Please try again later.",
    "status_code": 503
}))]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status_code: u16,
}

impl ErrorBody {
    fn new(status: StatusCode, error: &str) -> (StatusCode, Self) {
        (
            status,
            Self {
                error: error.to_string(),
                details: None,
                status_code: status.as_u16(),
            },
        )
    }

    fn with_details(
        status: StatusCode,
        error: &str,
        details: impl Into<String>,
    ) -> (StatusCode, Self) {
        let (status, mut body) = Self::new(status, error);
        body.details = Some(details.into());
        (status, body)
    }
}

/// Main error type for the HTTP layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Missing or wrong gateway bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Client sent a body that failed validation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document upload rejected
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// User has no calendar with this id
    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    /// Scheduling input that does not parse or does not exist
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// Multipart upload missing fields or unreadable
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Failure talking to the upstream model server
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn to_error_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Config(e) => ErrorBody::with_details(
                StatusCode::INTERNAL_SERVER_ERROR,
                ERROR_INTERNAL,
                e.to_string(),
            ),
            AppError::Unauthorized => ErrorBody::new(StatusCode::UNAUTHORIZED, ERROR_UNAUTHORIZED),
            AppError::Validation(msg) => ErrorBody::with_details(
                StatusCode::UNPROCESSABLE_ENTITY,
                ERROR_INVALID_REQUEST,
                msg.clone(),
            ),
            AppError::NotFound(_) => ErrorBody::new(StatusCode::NOT_FOUND, ERROR_FILE_NOT_FOUND),
            AppError::Document(e @ DocumentError::Unreadable(_)) => {
                ErrorBody::with_details(StatusCode::BAD_REQUEST, e.code(), e.to_string())
            }
            AppError::Document(e) => ErrorBody::new(StatusCode::BAD_REQUEST, e.code()),
            AppError::CalendarNotFound(_) => {
                ErrorBody::new(StatusCode::NOT_FOUND, ERROR_CALENDAR_NOT_FOUND)
            }
            AppError::Scheduling(e) => ErrorBody::with_details(
                StatusCode::UNPROCESSABLE_ENTITY,
                ERROR_INVALID_REQUEST,
                e.to_string(),
            ),
            AppError::Upload(msg) => ErrorBody::with_details(
                StatusCode::BAD_REQUEST,
                ERROR_UPLOAD_FAILED,
                msg.clone(),
            ),
            AppError::Upstream(e) => e.to_error_body(),
            AppError::Internal(msg) => ErrorBody::with_details(
                StatusCode::INTERNAL_SERVER_ERROR,
                ERROR_INTERNAL,
                msg.clone(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_error_body();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
