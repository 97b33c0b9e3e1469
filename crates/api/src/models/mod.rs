pub mod config;
pub mod prefix;
pub mod repository;
pub mod status;

pub use config::DiscoveryConfig;
pub use prefix::PrefixList;
pub use repository::{GroupFacet, ProxyFacet, RemoteAuth, Repository, RepositoryKind};
pub use status::{
    DiscoveryState, DiscoveryStatus, PublishingState, PublishingStatus, RoutingStatus,
};
