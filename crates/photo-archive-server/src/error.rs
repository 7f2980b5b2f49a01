use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Server error type that maps to HTTP status codes.
///
/// Only reachable before the archive response headers are committed.
#[derive(Debug)]
pub enum ServerError {
    NotFound(String),
    Internal(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

/// Outcome of a relay suspension point once the response is streaming.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("client closed the connection")]
    PeerClosed,

    #[error("download cancelled by server shutdown")]
    Cancelled,

    #[error("failed to read archive output: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to reap archive producer: {0}")]
    Wait(#[source] std::io::Error),

    #[error("archive producer failed: {0}")]
    ProducerFailed(String),
}

impl StreamError {
    /// Client- or server-initiated interruption rather than a fault.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::Cancelled)
    }
}
