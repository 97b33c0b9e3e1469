use crate::models::config::DiscoveryConfig;
use crate::storage::RepositoryStorage;
use std::fmt;
use std::sync::Arc;

/// Credentials used when talking to a proxy's remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyFacet {
    pub remote_url: String,
    /// Administratively blocked proxies never reach out to their remote.
    pub blocked: bool,
    pub discovery: DiscoveryConfig,
    pub auth: Option<RemoteAuth>,
}

impl ProxyFacet {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            blocked: false,
            discovery: DiscoveryConfig::default(),
            auth: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFacet {
    /// Member repository ids, in group order.
    pub members: Vec<String>,
}

/// Closed set of repository shapes known to automatic routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryKind {
    Hosted,
    Proxy(ProxyFacet),
    Group(GroupFacet),
    /// Virtual views over another repository; never routed.
    Shadow,
    /// Any layout or type routing does not understand.
    Unsupported,
}

impl RepositoryKind {
    pub fn name(&self) -> &'static str {
        match self {
            RepositoryKind::Hosted => "hosted",
            RepositoryKind::Proxy(_) => "proxy",
            RepositoryKind::Group(_) => "group",
            RepositoryKind::Shadow => "shadow",
            RepositoryKind::Unsupported => "unsupported",
        }
    }
}

#[derive(Clone)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub kind: RepositoryKind,
    /// Out of service repositories serve no requests and are never updated.
    pub in_service: bool,
    pub storage: Arc<dyn RepositoryStorage>,
}

impl Repository {
    pub fn new(
        id: impl Into<String>,
        kind: RepositoryKind,
        storage: Arc<dyn RepositoryStorage>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            in_service: true,
            storage,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.in_service = false;
        self
    }

    pub fn proxy(&self) -> Option<&ProxyFacet> {
        match &self.kind {
            RepositoryKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<&GroupFacet> {
        match &self.kind {
            RepositoryKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy().is_some()
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self.kind, RepositoryKind::Hosted)
    }

    /// Name used in log lines meant for administrators.
    pub fn humanized_name(&self) -> String {
        format!("\"{}\" [id={}]", self.name, self.id)
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("in_service", &self.in_service)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.name(), self.id)
    }
}
