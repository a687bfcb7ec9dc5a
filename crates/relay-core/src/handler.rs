//! The message handler capability.
//!
//! Every inbound message, whether it arrived as a WebSocket frame or as a
//! one-shot HTTP publish, is shown to exactly one [`MessageHandler`] before it
//! is fanned out. Handlers observe; they never decide whether a message is
//! broadcast, and their failures never abort the broadcast path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A side-effect-only hook invoked once per inbound message.
///
/// Implementations must return in bounded time: the hook runs inline on the
/// publishing task (a connection's read loop or an HTTP request).
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Observe one message.
    ///
    /// `source_id` identifies the origin (peer address of the connection or
    /// HTTP client). `payload` is the raw message.
    fn handle(&self, source_id: &str, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Failure reported by a [`MessageHandler`]. Logged by the caller, never
/// propagated.
#[derive(Debug, Error)]
#[error("{handler} handler failed: {message}")]
pub struct HandlerError {
    /// Name of the handler that failed.
    pub handler: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error.
    pub fn new(handler: &'static str, message: impl Into<String>) -> Self {
        Self {
            handler,
            message: message.into(),
        }
    }
}

/// Built-in handler selection, chosen once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// The HiLo guessing game placeholder.
    #[default]
    Hilo,
    /// Ignores every message.
    Silent,
}

impl HandlerKind {
    /// Wire/config name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hilo => "hilo",
            Self::Silent => "silent",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hilo" => Ok(Self::Hilo),
            "silent" => Ok(Self::Silent),
            other => Err(format!("unknown handler '{other}' (expected 'hilo' or 'silent')")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_display() {
        let err = HandlerError::new("hilo", "boom");
        assert_eq!(err.to_string(), "hilo handler failed: boom");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("HiLo".parse::<HandlerKind>().unwrap(), HandlerKind::Hilo);
        assert_eq!("silent".parse::<HandlerKind>().unwrap(), HandlerKind::Silent);
    }

    #[test]
    fn kind_rejects_unknown() {
        let err = "chess".parse::<HandlerKind>().unwrap_err();
        assert!(err.contains("chess"));
    }

    #[test]
    fn kind_default_is_hilo() {
        assert_eq!(HandlerKind::default(), HandlerKind::Hilo);
    }

    #[test]
    fn kind_serde_lowercase() {
        let json = serde_json::to_string(&HandlerKind::Silent).unwrap();
        assert_eq!(json, "\"silent\"");
        let back: HandlerKind = serde_json::from_str("\"hilo\"").unwrap();
        assert_eq!(back, HandlerKind::Hilo);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(HandlerKind::Hilo.to_string(), "hilo");
        assert_eq!(HandlerKind::Silent.to_string(), HandlerKind::Silent.as_str());
    }
}
