// Shared error taxonomy for the proxy core

use thiserror::Error;

/// Errors surfaced by the proxy core to the route layer.
///
/// The route layer maps these to transport status codes (typically 502 for
/// `Upstream`); nothing in this crate reinterprets or masks them.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Programmer error at a component boundary (zero TTL, zero capacity,
    /// unparseable configuration). Not expected in normal operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The client-credentials exchange failed. Never produced by the retry
    /// path; callers may retry the whole operation later.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upstream returned a non-retryable error or retries were exhausted.
    /// Carries the last observed status for diagnostics, when there was one.
    #[error("Upstream error (status {status:?}): {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    /// Upstream HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}
