/// Error type for plug-in boundaries (scrapers, custom strategies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
