//! Why a hub settings file could not be turned into [`RelaySettings`].
//!
//! [`RelaySettings`]: crate::RelaySettings

use std::path::PathBuf;

use thiserror::Error;

/// Settings load failure. Environment overrides never produce one; bad
/// `RELAY_*` values are logged and skipped instead.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that was being loaded.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or does not have the settings shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A value the hub cannot run with, such as a zero-sized queue.
    #[error("{key}: {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `hub.subscriberBuffer`.
        key: String,
        /// What the value must satisfy.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for the loader.
pub type Result<T> = std::result::Result<T, SettingsError>;
