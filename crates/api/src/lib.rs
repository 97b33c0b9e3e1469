pub mod error;
pub mod events;
pub mod models;
pub mod registry;
pub mod remote;
pub mod storage;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, BoxError};
pub use events::{ItemAction, ItemEvent, RepositoryEvent};
pub use models::*;
pub use registry::RepositoryRegistry;
pub use remote::{RemoteClient, RemoteClientFactory, RemoteResponse};
pub use storage::{OperationContext, RepositoryStorage, StorageEntry, StorageItem};
