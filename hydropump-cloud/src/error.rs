//! Error types for the hydropump-cloud crate.
//!
//! Messages never include the API key or request headers.

/// Errors that can occur while fetching a pump document.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The data API answered with a non-success status code.
    #[error("data API returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First part of the response body, if any.
        message: String,
    },

    /// The response body is not a valid pump document.
    #[error("parse error: {0}")]
    Parse(String),

    /// No document exists for the requested pump code.
    #[error("no document for pump {0}")]
    NotFound(String),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for hydropump-cloud results.
pub type Result<T> = std::result::Result<T, CloudError>;
