use crate::models::Repository;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    /// Content deployed by a user.
    Stored,
    /// Content fetched from a remote and cached.
    Cached,
    Deleted,
}

/// A change to a single storage item. Deleting the repository root is
/// reported as a `Deleted` event on `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    pub repository_id: String,
    pub path: String,
    pub action: ItemAction,
    pub routing_internal: bool,
}

/// Repository lifecycle and content notifications delivered to routing.
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    Added {
        repository_id: String,
    },
    Removed {
        repository: Arc<Repository>,
    },
    ConfigurationChanged {
        repository_id: String,
        remote_url_changed: bool,
        members_changed: bool,
        returned_to_service: bool,
    },
    Item(ItemEvent),
}

impl RepositoryEvent {
    pub fn repository_id(&self) -> &str {
        match self {
            RepositoryEvent::Added { repository_id } => repository_id,
            RepositoryEvent::Removed { repository } => &repository.id,
            RepositoryEvent::ConfigurationChanged { repository_id, .. } => repository_id,
            RepositoryEvent::Item(item) => &item.repository_id,
        }
    }
}
