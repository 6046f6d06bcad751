//! Error types for the conversion service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a conversion request
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Bad request shape or out-of-range parameter
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// An external image referenced by the HTML was rejected
    #[error("Disallowed external resource {url}: {reason}")]
    DisallowedResource { url: String, reason: String },

    /// Rendering exceeded the time budget
    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    /// Unrecoverable browser failure (launch, navigation, capture)
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Failed to initialize a service component
    #[error("Initialization failed: {0}")]
    Init(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Render(err.to_string())
    }
}
