//! Error types for reqwest-based requests and refresh responses.

use thiserror::Error;

/// Result type alias for reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The refresh endpoint answered with a non-success status.
    #[error("refresh endpoint returned HTTP {0}")]
    RefreshStatus(u16),
    /// The refresh endpoint answered without issuing an access token.
    #[error("refresh endpoint did not issue an access token")]
    RefreshDenied,
}

impl From<Error> for crate::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    crate::Error::timeout()
                        .with_message(e.to_string())
                        .with_source(e)
                } else if e.is_builder() {
                    crate::Error::new(crate::ErrorKind::InvalidInput)
                        .with_message(e.to_string())
                        .with_source(e)
                } else if e.is_connect() {
                    crate::Error::network_error()
                        .with_message("Connection failed")
                        .with_source(e)
                } else {
                    crate::Error::network_error()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => crate::Error::serialization()
                .with_message(e.to_string())
                .with_source(e),
            Error::RefreshStatus(status @ (401 | 403)) => {
                crate::Error::new(crate::ErrorKind::Authentication)
                    .with_message(Error::RefreshStatus(status).to_string())
            }
            err @ (Error::RefreshStatus(_) | Error::RefreshDenied) => {
                crate::Error::external_error().with_message(err.to_string())
            }
        }
    }
}
