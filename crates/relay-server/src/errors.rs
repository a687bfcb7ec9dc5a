//! Hub error type.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::rate_limit::RateLimitError;

/// Errors raised by sessions, the broadcaster, and the listener.
#[derive(Debug, Error)]
pub enum HubError {
    /// I/O failure on a connection.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// A single send did not complete within the write timeout.
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    /// The peer closed with a code other than normal or going-away.
    #[error("connection closed with unexpected code {code}: {reason}")]
    UnexpectedClose {
        /// Close code sent by the peer.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// The operation was interrupted by session or hub cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Message body above the configured cap. `size` is a lower bound when
    /// the body was cut off while reading.
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Observed size.
        size: usize,
        /// Configured cap.
        limit: usize,
    },

    /// The subscriber was force-closed before its upgrade completed.
    #[error("subscriber closed before the session became active")]
    ClosedBeforeActive,

    /// The rate limiter can never grant the request.
    #[error(transparent)]
    RateLimit(RateLimitError),

    /// A session task panicked or was aborted.
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl HubError {
    /// HTTP status for this error when it reaches a request handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RateLimitError> for HubError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled => Self::Cancelled,
            other @ RateLimitError::InsufficientCapacity { .. } => Self::RateLimit(other),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = status.canonical_reason().unwrap_or("error");
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_maps_to_413() {
        let err = HubError::PayloadTooLarge {
            size: 9000,
            limit: 8192,
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            err.to_string(),
            "payload of 9000 bytes exceeds the 8192 byte limit"
        );
    }

    #[test]
    fn cancelled_maps_to_503() {
        assert_eq!(
            HubError::Cancelled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unexpected_close_display() {
        let err = HubError::UnexpectedClose {
            code: 1011,
            reason: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection closed with unexpected code 1011: boom"
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limit_cancel_becomes_cancelled() {
        let err: HubError = RateLimitError::Cancelled.into();
        assert!(matches!(err, HubError::Cancelled));

        let err: HubError = RateLimitError::InsufficientCapacity {
            requested: 5,
            burst: 2,
        }
        .into();
        assert!(matches!(err, HubError::RateLimit(_)));
    }

    #[test]
    fn into_response_uses_status() {
        let resp = HubError::PayloadTooLarge { size: 1, limit: 0 }.into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn bind_error_names_address() {
        let err = HubError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
