//! Automatic routing for repository proxies: discovers which path prefixes a
//! repository can serve, publishes them as prefix files and rejects requests
//! outside them before they reach a remote.

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod filter;
pub mod logging;
pub mod manager;
pub mod prefix;
pub mod registry;
pub mod remote;
pub mod runtime;
pub mod status;
pub mod storage;
pub mod util;

pub use config::RoutingConfig;
pub use error::{Result, RoutingError};
pub use events::{EventBus, RoutingEvent};
pub use filter::{Rejection, RequestFilter};
pub use manager::{Manager, ManagerBuilder};
