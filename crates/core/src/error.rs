use autoroute_api::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Corrupt or oversized prefix file content.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Repository cannot be handled right now (out of service, blocked, unsupported).
    #[error("Illegal state: {0}")]
    IllegalState(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoutingError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RoutingError::Cancelled)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for RoutingError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        RoutingError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;
