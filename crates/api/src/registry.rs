use crate::error::ApiResult;
use crate::models::{DiscoveryConfig, Repository};
use std::sync::Arc;

/// Read access to the configured repositories plus the one write routing
/// needs: persisting a proxy's discovery configuration.
pub trait RepositoryRegistry: Send + Sync {
    fn repositories(&self) -> Vec<Arc<Repository>>;

    fn repository(&self, id: &str) -> Option<Arc<Repository>>;

    /// Groups listing `id` as a direct member.
    fn groups_of(&self, id: &str) -> Vec<Arc<Repository>>;

    fn set_discovery_config(&self, id: &str, config: DiscoveryConfig) -> ApiResult<()>;
}
