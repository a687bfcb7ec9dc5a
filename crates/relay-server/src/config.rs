//! Runtime configuration for the hub.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration consumed by [`crate::HubServer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound queue capacity per subscriber.
    pub subscriber_buffer: usize,
    /// Largest message accepted from either publish path.
    pub max_payload_bytes: usize,
    /// Largest `WebSocket` message the transport buffers before failing the read.
    pub max_frame_bytes: usize,
    /// Per-send timeout on the write loop, in milliseconds.
    pub write_timeout_ms: u64,
    /// Session lifetime cap, in seconds.
    pub max_session_secs: u64,
    /// Global limit applied inside every broadcast.
    pub publish_limit: RateLimitConfig,
    /// Per-connection limit applied to inbound frames.
    pub connection_limit: RateLimitConfig,
    /// Directory served at `GET /` when set.
    pub static_dir: Option<PathBuf>,
}

impl HubConfig {
    /// Per-send timeout.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Session lifetime cap.
    pub fn max_session(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            subscriber_buffer: 16,
            max_payload_bytes: 8 * 1024,
            max_frame_bytes: 64 * 1024,
            write_timeout_ms: 5_000,
            max_session_secs: 60 * 60,
            publish_limit: RateLimitConfig {
                interval_ms: 100,
                burst: 8,
            },
            connection_limit: RateLimitConfig {
                interval_ms: 100,
                burst: 10,
            },
            static_dir: None,
        }
    }
}

/// One token per `interval_ms`, at most `burst` stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Refill interval for a single token, in milliseconds.
    pub interval_ms: u64,
    /// Bucket capacity.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Refill interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
