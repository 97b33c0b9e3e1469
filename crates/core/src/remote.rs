//! reqwest backed remote access for proxies.

use async_trait::async_trait;
use autoroute_api::{
    ApiError, ApiResult, ProxyFacet, RemoteAuth, RemoteClient, RemoteClientFactory,
    RemoteResponse, Repository,
};
use std::sync::Arc;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("autoroute/", env!("CARGO_PKG_VERSION"));

pub struct HttpRemoteClient {
    client: reqwest::Client,
    auth: Option<RemoteAuth>,
}

impl HttpRemoteClient {
    pub fn new(timeout: Duration, auth: Option<RemoteAuth>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ApiError::Remote(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, auth })
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get(&self, url: &str) -> ApiResult<RemoteResponse> {
        let mut request = self.client.get(url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Remote(format!("GET {url}: {e}")))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Remote(format!("GET {url}: {e}")))?
            .to_vec();

        tracing::trace!(url, status, bytes = body.len(), "Remote response");
        Ok(RemoteResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builds one client per proxy with the proxy's credentials.
pub struct HttpRemoteClientFactory {
    timeout: Duration,
}

impl HttpRemoteClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RemoteClientFactory for HttpRemoteClientFactory {
    fn client_for(
        &self,
        _repository: &Repository,
        proxy: &ProxyFacet,
    ) -> ApiResult<Arc<dyn RemoteClient>> {
        let client = HttpRemoteClient::new(self.timeout, proxy.auth.clone())?;
        Ok(Arc::new(client))
    }
}
