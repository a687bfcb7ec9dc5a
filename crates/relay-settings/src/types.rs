//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a settings file only needs the
//! keys it wants to change.

use relay_core::HandlerKind;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network binding and static assets.
    pub server: ServerSettings,
    /// Broadcast hub limits.
    pub hub: HubSettings,
    /// Which message handler to load at startup.
    pub handler: HandlerKind,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        let hub = &self.hub;
        if hub.subscriber_buffer == 0 {
            return Err(SettingsError::invalid("hub.subscriberBuffer", "must be at least 1"));
        }
        if hub.max_payload_bytes == 0 {
            return Err(SettingsError::invalid("hub.maxPayloadBytes", "must be at least 1"));
        }
        if hub.max_frame_bytes < hub.max_payload_bytes {
            return Err(SettingsError::invalid(
                "hub.maxFrameBytes",
                "must not be smaller than hub.maxPayloadBytes",
            ));
        }
        if hub.write_timeout_ms == 0 {
            return Err(SettingsError::invalid("hub.writeTimeoutMs", "must be at least 1"));
        }
        if hub.max_session_secs == 0 {
            return Err(SettingsError::invalid("hub.maxSessionSecs", "must be at least 1"));
        }
        hub.publish_limit.validate("hub.publishLimit")?;
        hub.connection_limit.validate("hub.connectionLimit")?;
        Ok(())
    }
}

/// Network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Directory served at `GET /`. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: None,
        }
    }
}

/// Broadcast hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Outbound queue capacity per subscriber before it is evicted.
    pub subscriber_buffer: usize,
    /// Largest accepted message body, for both publish paths.
    pub max_payload_bytes: usize,
    /// Largest WebSocket message the transport will buffer at all.
    pub max_frame_bytes: usize,
    /// Per-send timeout on the write loop, in milliseconds.
    pub write_timeout_ms: u64,
    /// Maximum lifetime of one WebSocket session, in seconds.
    pub max_session_secs: u64,
    /// Global limit applied inside every broadcast.
    pub publish_limit: RateLimitSettings,
    /// Per-connection limit applied to inbound frames.
    pub connection_limit: RateLimitSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 16,
            max_payload_bytes: 8192,
            max_frame_bytes: 65_536,
            write_timeout_ms: 5000,
            max_session_secs: 3600,
            publish_limit: RateLimitSettings {
                interval_ms: 100,
                burst: 8,
            },
            connection_limit: RateLimitSettings {
                interval_ms: 100,
                burst: 10,
            },
        }
    }
}

/// Token bucket parameters: one token per `interval_ms`, at most `burst`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Refill interval for one token, in milliseconds.
    pub interval_ms: u64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            burst: 8,
        }
    }
}

impl RateLimitSettings {
    fn validate(&self, key: &str) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SettingsError::invalid(
                format!("{key}.intervalMs"),
                "must be at least 1",
            ));
        }
        if self.burst == 0 {
            return Err(SettingsError::invalid(
                format!("{key}.burst"),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line per event.
    #[default]
    Compact,
    /// JSON lines.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level shown when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}
