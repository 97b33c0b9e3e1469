use crate::error::{Result, RoutingError};
use async_trait::async_trait;
use autoroute_api::{ProxyFacet, RemoteClient, RemoteResponse, Repository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a remote strategy concluded.
#[derive(Debug)]
pub enum StrategyOutcome {
    Success {
        message: String,
        entries: Vec<String>,
        /// Epoch millis the remote reports for the content, if any.
        last_modified: Option<i64>,
    },
    /// Routing must not be used for this remote; stops the chain.
    Disabled(String),
    /// Nothing found, the next strategy may do better.
    Failed(String),
    /// Unexpected error; stops the chain.
    Errored(RoutingError),
}

/// Everything a strategy needs to talk to one proxy's remote.
pub struct StrategyContext<'a> {
    pub repository: &'a Repository,
    pub proxy: &'a ProxyFacet,
    pub client: Arc<dyn RemoteClient>,
    pub cancel: CancellationToken,
}

impl StrategyContext<'_> {
    pub fn url_of(&self, path: &str) -> Result<String> {
        crate::util::join_url(&self.proxy.remote_url, path)
    }

    /// GET that gives up as soon as the job is cancelled.
    pub async fn fetch(&self, path: &str) -> Result<RemoteResponse> {
        let url = self.url_of(path)?;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RoutingError::Cancelled),
            response = self.client.get(&url) => Ok(response?),
        }
    }
}

#[async_trait]
pub trait RemoteStrategy: Send + Sync {
    fn id(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    async fn discover(&self, ctx: &StrategyContext<'_>) -> StrategyOutcome;
}
