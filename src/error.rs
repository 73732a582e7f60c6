//! Error types for the document proxy.
//!
//! Every failure in the request pipeline is a [`ProxyError`]. The mapping to
//! an HTTP status, a machine-readable code and a client message lives in
//! [`ProxyError::envelope`] and nowhere else.

use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Why an upstream call did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Connection refused, reset, DNS or TLS failure.
    Unreachable,
    /// Connect or response deadline expired.
    Timeout,
    /// No upstream slot became free within the acquire wait.
    Saturated,
    /// The backend answered with a server error.
    BadStatus,
}

impl UpstreamFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamFailure::Unreachable => "unreachable",
            UpstreamFailure::Timeout => "timeout",
            UpstreamFailure::Saturated => "saturated",
            UpstreamFailure::BadStatus => "bad_status",
        }
    }
}

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Path does not match the document route, or an identifier is malformed.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// The request tries to address the storage backend directly.
    #[error("direct backend access attempt: {0}")]
    ForbiddenDirectAccess(&'static str),

    /// Only GET and HEAD are served on the document route.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The client's token bucket is empty.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The backend confirmed the object does not exist.
    #[error("object not found upstream")]
    NotFound,

    /// The backend could not be reached or failed.
    #[error("upstream {}: {detail}", .kind.as_str())]
    Upstream {
        kind: UpstreamFailure,
        /// Logged only; never sent to the client.
        detail: String,
    },

    /// The backend refused the request with a client error other than 404.
    /// The status is kept; the backend's body is not.
    #[error("backend answered {0}")]
    UpstreamStatus(StatusCode),

    /// A fault inside the proxy itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn upstream(kind: UpstreamFailure, detail: impl Into<String>) -> Self {
        ProxyError::Upstream {
            kind,
            detail: detail.into(),
        }
    }

    /// The single place that decides status, code and client message.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (status, code, message) = match self {
            ProxyError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "Document and attachment identifiers must match [A-Za-z0-9_.-]+",
            ),
            ProxyError::ForbiddenDirectAccess(_) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Direct storage access is not permitted",
            ),
            ProxyError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "Only GET and HEAD are supported",
            ),
            ProxyError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests, retry later",
            ),
            ProxyError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "The requested attachment does not exist",
            ),
            ProxyError::Upstream { kind, .. } => match kind {
                UpstreamFailure::Timeout => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "upstream_timeout",
                    "The document service did not respond in time",
                ),
                UpstreamFailure::Saturated => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "upstream_busy",
                    "The document service is busy, retry later",
                ),
                UpstreamFailure::Unreachable | UpstreamFailure::BadStatus => (
                    StatusCode::BAD_GATEWAY,
                    "upstream_unavailable",
                    "The document service is unavailable",
                ),
            },
            ProxyError::UpstreamStatus(status) => (
                *status,
                "upstream_rejected",
                "The document service rejected the request",
            ),
            ProxyError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        ErrorEnvelope {
            code,
            message,
            http_status: status,
        }
    }
}

/// The only error shape ever returned to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: &'static str,
    pub http_status: StatusCode,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.http_status, Json(body)).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if let ProxyError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Internal pipeline error");
        }

        let mut response = self.envelope().into_response();
        let headers = response.headers_mut();
        match self {
            ProxyError::RateLimited => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            }
            ProxyError::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            }
            _ => {}
        }
        response
    }
}
