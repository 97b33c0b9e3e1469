use autoroute_api::{ProxyFacet, Repository, RepositoryKind};
use autoroute_core::manager::Manager;
use autoroute_core::registry::InMemoryRepositoryRegistry;
use autoroute_core::storage::FsStorage;
use autoroute_core::RoutingConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::info;

#[derive(Tabled)]
struct DiscoverRow {
    #[tabled(rename = "Remote")]
    remote: String,
    #[tabled(rename = "Discovery")]
    state: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Prefixes")]
    prefixes: usize,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn run(
    config: RoutingConfig,
    urls: Vec<String>,
    show_entries: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workdir = tempfile::tempdir()?;
    let registry = Arc::new(InMemoryRepositoryRegistry::new());
    let repositories: Vec<Arc<Repository>> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let id = format!("remote-{i}");
            let storage = Arc::new(FsStorage::new(workdir.path().join(&id)));
            registry.register(
                Repository::new(id, RepositoryKind::Proxy(ProxyFacet::new(url)), storage)
                    .with_name(url),
            )
        })
        .collect();

    let manager = Manager::builder(config, registry).build()?;
    for repository in &repositories {
        info!("Probing {}...", repository.name);
        manager.force_update_prefix_file(repository)?;
    }
    while manager.is_update_job_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let reports = join_all(repositories.iter().map(|repository| {
        let manager = manager.clone();
        async move {
            let status = manager.status_for(repository).await?;
            let source = manager.prefix_source_for(repository);
            let entries = match source.read().await? {
                Some((list, _)) if list.supported => list.entries,
                _ => Vec::new(),
            };
            Ok::<_, autoroute_core::RoutingError>((repository.name.clone(), status, entries))
        }
    }))
    .await;

    let mut rows = Vec::new();
    let mut listings = Vec::new();
    for report in reports {
        let (remote, status, entries) = report?;
        rows.push(DiscoverRow {
            remote: remote.clone(),
            state: status.discovery.state.to_string(),
            strategy: status.discovery.last_strategy_id,
            prefixes: entries.len(),
            message: status.discovery.last_message,
        });
        listings.push((remote, entries));
    }
    println!("{}", Table::new(rows));

    if show_entries {
        for (remote, entries) in listings {
            println!("\n{remote}");
            for entry in entries {
                println!("  {entry}");
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
