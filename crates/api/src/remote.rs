use crate::error::ApiResult;
use crate::models::{ProxyFacet, Repository};
use async_trait::async_trait;
use std::sync::Arc;

/// A fully buffered remote response. Header names are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RemoteResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, url: &str) -> ApiResult<RemoteResponse>;
}

/// Builds clients honouring a proxy's connection settings.
pub trait RemoteClientFactory: Send + Sync {
    fn client_for(
        &self,
        repository: &Repository,
        proxy: &ProxyFacet,
    ) -> ApiResult<Arc<dyn RemoteClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = RemoteResponse::new(200).with_header("Server", "nginx");
        assert_eq!(response.header("server"), Some("nginx"));
        assert_eq!(response.header("SERVER"), Some("nginx"));
        assert!(response.header("x-missing").is_none());
        assert!(response.is_success());
        assert!(!RemoteResponse::new(404).is_success());
    }
}
