//! The routing manager: owns the update executor, the artifact locks and the
//! discoverers, and turns discovery results into published prefix files.

use crate::config::RoutingConfig;
use crate::discovery::{
    Blacklist, HtmlIndexScraper, LocalContentDiscoverer, RemoteContentDiscoverer,
    RemotePrefixFileStrategy, RemoteStrategy, ScrapeStrategy, Scraper,
};
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RoutingEvent};
use crate::prefix::{FilePrefixSource, PrefixSource, TextMarshaller};
use crate::remote::HttpRemoteClientFactory;
use crate::runtime::{ConstrainedExecutor, LockTable};
use crate::status::DiscoveryStatusStore;
use autoroute_api::{
    ApiError, RemoteClientFactory, Repository, RepositoryEvent, RepositoryKind, RepositoryRegistry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

mod dispatch;
mod publish;
mod status;
mod update;

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct Manager {
    config: RoutingConfig,
    registry: Arc<dyn RepositoryRegistry>,
    marshaller: TextMarshaller,
    locks: Arc<LockTable>,
    executor: ConstrainedExecutor,
    local_discoverer: LocalContentDiscoverer,
    remote_discoverer: RemoteContentDiscoverer,
    status_store: DiscoveryStatusStore,
    bus: EventBus,

    /// Repository notifications enter here; the dispatcher task drains them.
    events_tx: mpsc::Sender<RepositoryEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<RepositoryEvent>>>,

    /// Stops the ticker and the dispatcher.
    cancel_token: CancellationToken,
    started: AtomicBool,
    first_tick_done: AtomicBool,
}

pub struct ManagerBuilder {
    config: RoutingConfig,
    registry: Arc<dyn RepositoryRegistry>,
    client_factory: Option<Arc<dyn RemoteClientFactory>>,
    scrapers: Vec<Arc<dyn Scraper>>,
    strategies: Vec<Arc<dyn RemoteStrategy>>,
    bus: Option<EventBus>,
}

impl ManagerBuilder {
    pub fn new(config: RoutingConfig, registry: Arc<dyn RepositoryRegistry>) -> Self {
        Self {
            config,
            registry,
            client_factory: None,
            scrapers: Vec::new(),
            strategies: Vec::new(),
            bus: None,
        }
    }

    pub fn with_client_factory(mut self, factory: Arc<dyn RemoteClientFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    /// Replaces the default index page scraper. Call repeatedly to add more.
    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scrapers.push(scraper);
        self
    }

    /// Adds a remote strategy next to the built-in prefix-file and scrape ones.
    pub fn with_strategy(mut self, strategy: Arc<dyn RemoteStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Arc<Manager>> {
        let config = self.config;
        config.validate()?;

        let marshaller = TextMarshaller::new(
            config.prefix_file_max_entries,
            config.prefix_file_max_line_length,
        );
        let locks = Arc::new(LockTable::new());
        let blacklist = Arc::new(Blacklist::new(
            &config.blacklisted_headers,
            &config.blacklisted_server_names,
        ));

        let scrapers = if self.scrapers.is_empty() {
            vec![Arc::new(HtmlIndexScraper) as Arc<dyn Scraper>]
        } else {
            self.scrapers
        };
        let mut strategies: Vec<Arc<dyn RemoteStrategy>> = vec![
            Arc::new(RemotePrefixFileStrategy::new(
                config.remote_prefix_file_path.clone(),
                marshaller,
                blacklist.clone(),
                locks.clone(),
            )),
            Arc::new(ScrapeStrategy::new(
                scrapers,
                config.remote_scrape_depth,
                blacklist,
            )),
        ];
        strategies.extend(self.strategies);

        let client_factory = self.client_factory.unwrap_or_else(|| {
            Arc::new(HttpRemoteClientFactory::new(config.remote_timeout()))
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Arc::new(Manager {
            registry: self.registry,
            marshaller,
            executor: ConstrainedExecutor::new(config.worker_pool_size),
            local_discoverer: LocalContentDiscoverer::new(config.local_scrape_depth)?,
            remote_discoverer: RemoteContentDiscoverer::new(strategies, client_factory),
            status_store: DiscoveryStatusStore::new(
                config.discovery_status_file_path.clone(),
                locks.clone(),
            ),
            locks,
            bus: self.bus.unwrap_or_default(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            first_tick_done: AtomicBool::new(false),
            config,
        }))
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Manager {
    pub fn builder(config: RoutingConfig, registry: Arc<dyn RepositoryRegistry>) -> ManagerBuilder {
        ManagerBuilder::new(config, registry)
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Sender for repository notifications (storage, configuration changes).
    pub fn event_sender(&self) -> mpsc::Sender<RepositoryEvent> {
        self.events_tx.clone()
    }

    /// Replays the state of existing prefix files on the event bus, then starts
    /// the periodic updater and the notification dispatcher.
    pub async fn startup(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.config.feature_active {
            tracing::info!("Automatic routing is not active");
            // Nobody will drain the queue.
            self.take_events_rx();
            return Ok(());
        }

        for repository in self.registry.repositories() {
            if !self.is_repository_supported(&repository) || !repository.in_service {
                continue;
            }
            if let Err(e) = self.replay_prefix_file_state(&repository).await {
                tracing::warn!(
                    "Cannot initialize prefix file state of {}: {}",
                    repository.humanized_name(),
                    e
                );
            }
        }

        self.spawn_ticker();
        if let Some(rx) = self.take_events_rx() {
            self.spawn_dispatcher(rx);
        }
        tracing::info!("Automatic routing started");
        Ok(())
    }

    async fn replay_prefix_file_state(self: &Arc<Self>, repository: &Arc<Repository>) -> Result<()> {
        let source = self.prefix_source_for(repository);
        let state = {
            let _guard = source.lock().read().await;
            if !source.exists().await? {
                return Ok(());
            }
            source.read().await
        };
        tracing::debug!("Initializing prefix file of {}", repository);
        match state {
            Ok(Some((list, _))) if list.supported => {
                self.bus.publish(RoutingEvent::Published {
                    repository: repository.clone(),
                    source,
                });
            }
            Ok(_) => {
                self.bus.publish(RoutingEvent::Unpublished {
                    repository: repository.clone(),
                });
            }
            Err(RoutingError::InvalidInput(reason)) => {
                tracing::warn!(
                    "Prefix file of {} is corrupt ({}), unpublishing",
                    repository.humanized_name(),
                    reason
                );
                self.unpublish(repository).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Stops receiving notifications and the periodic updater, cancels running
    /// jobs and waits a bounded time for them.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.executor.close();
        let grace = self.config.shutdown_grace();
        if !self.executor.join_all(grace).await {
            tracing::warn!("Routing update jobs were forcibly stopped");
        }
        tracing::info!("Automatic routing stopped");
    }

    /// True while update jobs run, or while the first periodic check after
    /// startup has not completed.
    pub fn is_update_job_running(&self) -> bool {
        let booting = self.config.feature_active
            && self.started.load(Ordering::SeqCst)
            && !self.first_tick_done.load(Ordering::SeqCst);
        if booting {
            tracing::debug!("Periodic updater did not finish its first run yet");
            return true;
        }
        let running = self.executor.running_keys();
        if !running.is_empty() {
            tracing::debug!("Running update jobs for {:?}", running);
        }
        !running.is_empty()
    }

    pub fn is_repository_supported(&self, repository: &Repository) -> bool {
        matches!(
            repository.kind,
            RepositoryKind::Hosted | RepositoryKind::Proxy(_) | RepositoryKind::Group(_)
        )
    }

    /// Fails with `IllegalState` when the repository cannot be updated.
    fn check_update_conditions(&self, repository: &Repository) -> Result<()> {
        if !self.is_repository_supported(repository) {
            return Err(RoutingError::IllegalState(format!(
                "Repository not supported by automatic routing feature (only hosted, proxy and group repositories are supported): {}",
                repository.humanized_name()
            )));
        }
        if !repository.in_service {
            return Err(RoutingError::IllegalState(format!(
                "Repository out of service '{}'",
                repository.id
            )));
        }
        Ok(())
    }

    pub fn prefix_source_for(&self, repository: &Repository) -> FilePrefixSource {
        let path = &self.config.local_prefix_file_path;
        FilePrefixSource::new(
            repository.id.clone(),
            path.clone(),
            repository.storage.clone(),
            self.marshaller,
            self.locks.lock_for(&repository.id, path),
        )
    }

    fn repository(&self, id: &str) -> Result<Arc<Repository>> {
        self.registry
            .repository(id)
            .ok_or_else(|| ApiError::NotFound(format!("repository '{id}'")).into())
    }

    fn take_events_rx(&self) -> Option<mpsc::Receiver<RepositoryEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn spawn_ticker(self: &Arc<Self>) {
        let manager = Arc::downgrade(self);
        let cancel_token = self.cancel_token.clone();
        let period = self.config.update_check_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.may_update_all().await;
                        manager.first_tick_done.store(true, Ordering::SeqCst);
                    }
                }
            }
            tracing::debug!("Routing periodic updater stopped");
        });
    }
}
