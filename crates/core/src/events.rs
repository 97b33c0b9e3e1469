use crate::prefix::FilePrefixSource;
use autoroute_api::Repository;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Notifications emitted after a prefix file changed state.
#[derive(Debug, Clone)]
pub enum RoutingEvent {
    Published {
        repository: Arc<Repository>,
        source: FilePrefixSource,
    },
    Unpublished {
        repository: Arc<Repository>,
    },
}

impl RoutingEvent {
    pub fn repository(&self) -> &Arc<Repository> {
        match self {
            RoutingEvent::Published { repository, .. } => repository,
            RoutingEvent::Unpublished { repository } => repository,
        }
    }
}

/// Fan-out of [`RoutingEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RoutingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoutingEvent> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers got the event. Nobody listening is fine.
    pub fn publish(&self, event: RoutingEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
