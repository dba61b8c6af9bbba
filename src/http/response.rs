//! Response handling.
//!
//! # Responsibilities
//! - Map dispatch failures to HTTP status codes
//! - Keep backend responses untouched (status, headers and body pass through)
//!
//! # Design Decisions
//! - Selection and transport failures both answer 503; neither is retried
//! - A timed-out backend is logged distinctly but answered the same way

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::load_balancer::SelectError;

/// Errors that end a dispatch before a backend response is obtained.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("no backend available")]
    NoBackendAvailable,

    #[error("backend {backend} unreachable: {source}")]
    UpstreamUnreachable {
        backend: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("backend {backend} did not respond within {timeout_secs}s")]
    UpstreamTimeout { backend: String, timeout_secs: f64 },

    #[error("could not build request for backend {backend}: {reason}")]
    InvalidUpstreamRequest { backend: String, reason: String },
}

impl From<SelectError> for ProxyError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NoBackendAvailable => ProxyError::NoBackendAvailable,
        }
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoBackendAvailable
            | ProxyError::UpstreamUnreachable { .. }
            | ProxyError::UpstreamTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InvalidUpstreamRequest { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ProxyError::NoBackendAvailable => "No servers available\n",
            ProxyError::UpstreamUnreachable { .. } | ProxyError::UpstreamTimeout { .. } => {
                "Error contacting server\n"
            }
            ProxyError::InvalidUpstreamRequest { .. } => "Error creating request\n",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body(),
        )
            .into_response()
    }
}
