//! Error types shared across IPGeo crates

use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for shared IPGeo operations
pub type Result<T> = std::result::Result<T, IpGeoError>;

/// Errors raised by configuration and process bootstrap
#[derive(Error, Debug)]
pub enum IpGeoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl IpGeoError {
    /// Create an invalid setting error for an environment key
    pub fn invalid_setting(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Render an error and all of its nested causes on one line.
///
/// Causes are joined with `": "`. A cause whose text is already part of the
/// previous message (common with `#[error("...: {0}")]` wrappers) is skipped
/// so the same diagnostic is not printed twice.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut previous = rendered.clone();
    let mut source = err.source();

    while let Some(cause) = source {
        let text = cause.to_string();
        if !previous.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        previous = text;
        source = cause.source();
    }

    rendered
}
