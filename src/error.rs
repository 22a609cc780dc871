//! Error types for the request orchestration layer.
//!
//! The taxonomy follows the boundary it belongs to: [`TransportError`] at the
//! network seam, [`InterceptorError`] inside the pipeline, and [`ApiError`]
//! as the caller-facing shape embedded in an
//! [`ApiResult`](crate::types::ApiResult). `ApiClient::request` never lets an
//! error escape as `Err` — every failure path resolves to an `ApiResult`
//! carrying one of these.

use serde::Serialize;
use thiserror::Error;

/// Stable machine-readable codes carried on failed [`ApiResult`]s.
///
/// [`ApiResult`]: crate::types::ApiResult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// The request was cancelled, either by the caller's token or by the
    /// client timeout. Never retried.
    #[serde(rename = "REQUEST_ABORTED")]
    RequestAborted,
    /// A transport failure after retry exhaustion, or an interceptor failure.
    #[serde(rename = "REQUEST_ERROR")]
    RequestError,
    /// A failure that fits no other category.
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorCode {
    /// The wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestAborted => "REQUEST_ABORTED",
            Self::RequestError => "REQUEST_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing error embedded in a failed [`ApiResult`](crate::types::ApiResult).
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message} ({code})")]
pub struct ApiError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description of what failed.
    pub message: String,
    /// HTTP status, when the failure happened after a response was received.
    pub status: Option<u16>,
}

impl ApiError {
    /// An aborted-request error.
    #[must_use]
    pub fn aborted() -> Self {
        Self {
            code: ErrorCode::RequestAborted,
            message: "Request was cancelled".to_string(),
            status: None,
        }
    }

    /// A request error with the given message.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RequestError,
            message: message.into(),
            status: None,
        }
    }

    /// An unclassified error.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Unknown,
            message: message.into(),
            status: None,
        }
    }
}

/// Errors surfaced by a [`Transport`](crate::transport::Transport)
/// implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request was cancelled through its cancellation token before a
    /// response arrived. The retry loop terminates immediately on this.
    #[error("Request aborted")]
    Aborted,

    /// A network-level failure: unreachable host, DNS, TLS, connection
    /// reset. Retried up to policy limits.
    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised inside a request or response interceptor.
///
/// Interceptors run outside the retry loop's scope, so these are never
/// retried; the orchestrator maps them to
/// [`ErrorCode::RequestError`].
#[derive(Debug, Clone, Error)]
#[error("Interceptor failed: {0}")]
pub struct InterceptorError(pub String);

impl InterceptorError {
    /// Build an error from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}
