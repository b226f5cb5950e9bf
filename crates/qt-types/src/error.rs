use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid release `{value}`")]
    InvalidRelease { value: String },

    #[error("invalid path `{value}`: {reason}")]
    InvalidPath { value: String, reason: String },

    #[error("invalid object name `{value}`: {reason}")]
    InvalidObjectName { value: String, reason: String },

    #[error("invalid registry: {0}")]
    Registry(String),
}

impl TypeError {
    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHex(_) | Self::InvalidLength { .. } => "type.digest",
            Self::InvalidRelease { .. } => "release.invalid",
            Self::InvalidPath { .. } => "path.invalid",
            Self::InvalidObjectName { .. } => "object.fetch.name",
            Self::Registry(_) => "registry.invalid",
        }
    }
}
