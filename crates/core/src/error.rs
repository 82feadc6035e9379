//! Configuration error model.

use thiserror::Error;

/// Result type used by configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error raised while resolving or validating configuration.
///
/// These are deployment problems, not transient conditions: callers surface
/// them at startup instead of retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key had no value.
    #[error("missing configuration key: {0}")]
    Missing(String),

    /// A key was present but could not be decoded into the requested type.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    /// A value failed validation (e.g. empty host).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
