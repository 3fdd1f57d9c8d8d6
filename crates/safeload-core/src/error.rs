//! Error types for the verification engine.

use std::time::Duration;

use crate::container::ContainerError;

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Trust policy has never been loaded (or did not load in time).
    #[error("trust policy unavailable: {message}")]
    PolicyUnavailable { message: String },

    /// Signed container is malformed.
    #[error("container format error: {0}")]
    ContainerFormat(#[from] ContainerError),

    /// Certificate parse, chain, or validity failure.
    #[error("certificate error: {reason}")]
    Certificate { reason: String },

    /// The trust authority could not be consulted.
    #[error("revocation status unavailable: {message}")]
    RevocationUnavailable { message: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from the trust service.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Host download-manager call failed.
    #[error("host error: {message}")]
    Host { message: String },

    /// Local I/O error (reading a payload stream).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Usage / config issues
            Self::Config { .. } => 1,
            Self::PolicyUnavailable { .. } => 1,

            // Auth issues
            Self::Unauthorized { .. } => 2,

            // Security issues (higher priority)
            Self::ContainerFormat(_) => 4,
            Self::Certificate { .. } => 4,

            // Network/transient
            Self::RateLimited { .. } => 5,
            Self::Network { .. } => 5,
            Self::RevocationUnavailable { .. } => 5,

            // Other
            Self::InvalidResponse { .. } => 6,
            Self::Host { .. } => 6,
            Self::Io(_) => 6,
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type GateResult<T> = Result<T, GateError>;
