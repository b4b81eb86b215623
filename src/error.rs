//! Error types for the pump controller.

use hydropump_cloud::CloudError;

/// Top-level error type for the pump controller.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// No timer could be allocated for a pump line.
    #[error("timer resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Configuration fetch or time query failed (including timeouts).
    #[error("transport error: {0}")]
    Transport(String),

    /// The fetched document cannot be turned into a schedule and duration.
    #[error("malformed config: {0}")]
    MalformedConfig(String),

    /// The network link is down.
    #[error("link down: {0}")]
    LinkDown(String),

    /// A local schedule or pulse value was rejected.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Static configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CloudError> for PumpError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Parse(_) | CloudError::NotFound(_) => Self::MalformedConfig(e.to_string()),
            CloudError::Config(msg) => Self::Config(msg),
            CloudError::Http(_) | CloudError::Timeout(_) | CloudError::Status { .. } => {
                Self::Transport(e.to_string())
            }
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PumpError>;
