#![allow(dead_code)]

use async_trait::async_trait;
use autoroute_api::{
    ApiResult, OperationContext, ProxyFacet, RemoteClient, RemoteClientFactory, RemoteResponse,
    Repository, RepositoryKind, RepositoryStorage,
};
use autoroute_core::manager::Manager;
use autoroute_core::prefix::marshal::MAGIC;
use autoroute_core::registry::InMemoryRepositoryRegistry;
use autoroute_core::storage::FsStorage;
use autoroute_core::RoutingConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers GETs from a fixed table, 404 for anything else, and records them.
#[derive(Default)]
pub struct ScriptedRemote {
    responses: Mutex<HashMap<String, RemoteResponse>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: RemoteResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn get(&self, url: &str) -> ApiResult<RemoteResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| RemoteResponse::new(404)))
    }
}

pub struct ScriptedFactory(pub Arc<ScriptedRemote>);

impl RemoteClientFactory for ScriptedFactory {
    fn client_for(
        &self,
        _repository: &Repository,
        _proxy: &ProxyFacet,
    ) -> ApiResult<Arc<dyn RemoteClient>> {
        Ok(self.0.clone())
    }
}

pub fn prefix_file(entries: &[&str]) -> String {
    let mut content = format!("{MAGIC}\n");
    for entry in entries {
        content.push_str(entry);
        content.push('\n');
    }
    content
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub registry: Arc<InMemoryRepositoryRegistry>,
    pub remote: Arc<ScriptedRemote>,
    pub manager: Arc<Manager>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(RoutingConfig::default())
    }

    pub fn with_config(config: RoutingConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRepositoryRegistry::new());
        let remote = ScriptedRemote::new();
        let manager = Manager::builder(config, registry.clone())
            .with_client_factory(Arc::new(ScriptedFactory(remote.clone())))
            .build()
            .unwrap();
        Self {
            dir,
            registry,
            remote,
            manager,
        }
    }

    pub fn storage(&self, id: &str) -> Arc<FsStorage> {
        Arc::new(
            FsStorage::new(self.dir.path().join(id)).with_notifier(id, self.manager.event_sender()),
        )
    }

    pub fn add(&self, id: &str, kind: RepositoryKind) -> Arc<Repository> {
        let storage = self.storage(id);
        self.registry.register(Repository::new(id, kind, storage))
    }

    pub fn add_proxy(&self, id: &str, remote_url: &str) -> Arc<Repository> {
        self.add(id, RepositoryKind::Proxy(ProxyFacet::new(remote_url)))
    }

    pub fn root(&self, id: &str) -> std::path::PathBuf {
        self.dir.path().join(id)
    }

    /// Waits until no update job runs, including ones spawned by propagation.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if !self.manager.is_update_job_running() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    if !self.manager.is_update_job_running() {
                        break;
                    }
                }
            }
        })
        .await
        .expect("update jobs did not settle");
    }

    pub async fn published_entries(&self, repository: &Repository) -> Option<Vec<String>> {
        let source = self.manager.prefix_source_for(repository);
        match source.read().await.unwrap() {
            Some((list, _)) if list.supported => Some(list.entries),
            _ => None,
        }
    }
}

pub async fn put(storage: &dyn RepositoryStorage, path: &str, content: &str) {
    storage
        .put(path, content.as_bytes(), "application/octet-stream", OperationContext::user())
        .await
        .unwrap();
}

pub fn write_file(root: &Path, path: &str, content: &str) {
    let file = root.join(path.trim_start_matches('/'));
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, content).unwrap();
}
