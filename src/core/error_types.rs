//! Shared constants for structured API errors and upstream failure kinds.

use std::fmt;

pub const ERROR_SERVICE_UNAVAILABLE: &str = "service_unavailable";
pub const ERROR_UPSTREAM_TIMEOUT: &str = "upstream_timeout";
pub const ERROR_UPSTREAM: &str = "upstream_error";
pub const ERROR_UNKNOWN_MODEL: &str = "unknown_model";
pub const ERROR_UNAUTHORIZED: &str = "unauthorized";
pub const ERROR_INVALID_REQUEST: &str = "invalid_request";
pub const ERROR_INTERNAL: &str = "internal_error";
pub const ERROR_FILE_NOT_FOUND: &str = "file_not_found";
pub const ERROR_UPLOAD_FAILED: &str = "upload_failed";
pub const ERROR_CALENDAR_NOT_FOUND: &str = "calendar_not_found";

/// Fixed detail attached to every circuit-open rejection.
pub const CIRCUIT_OPEN_DETAILS: &str =
    "The upstream model server is temporarily unavailable. Please try again later.";

/// Classification of an upstream failure, used for logs, metrics and
/// the `kind` of a streaming error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamErrorKind {
    CircuitOpen,
    Timeout,
    Transport,
    Http,
    Decode,
    StreamMisuse,
}

impl UpstreamErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Http => "http",
            Self::Decode => "decode",
            Self::StreamMisuse => "stream_misuse",
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome label for a single upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Terminal,
}

impl AttemptOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retryable => "retryable",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
