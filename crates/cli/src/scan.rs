use autoroute_api::{Repository, RepositoryKind};
use autoroute_core::discovery::LocalContentDiscoverer;
use autoroute_core::prefix::TextMarshaller;
use autoroute_core::storage::FsStorage;
use autoroute_core::RoutingConfig;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(
    mut config: RoutingConfig,
    path: PathBuf,
    depth: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(depth) = depth {
        config.local_scrape_depth = depth;
        config.validate()?;
    }
    if !path.is_dir() {
        return Err(format!("{} is not a directory", path.display()).into());
    }

    let repository = Repository::new(
        "scan",
        RepositoryKind::Hosted,
        Arc::new(FsStorage::new(&path)),
    );
    let discoverer = LocalContentDiscoverer::new(config.local_scrape_depth)?;

    info!("Scanning repository at: {}...", path.display());
    let result = discoverer
        .discover(&repository, &CancellationToken::new())
        .await?;
    let message = result
        .last_outcome()
        .map(|o| o.message.clone())
        .unwrap_or_default();
    let Some(source) = result.into_prefix_source() else {
        return Err(format!("Scan failed: {message}").into());
    };
    info!("{}", message);

    let marshaller = TextMarshaller::new(
        config.prefix_file_max_entries,
        config.prefix_file_max_line_length,
    );
    let bytes = marshaller.marshal(source.list());
    // Refuse to emit what a proxy would reject as corrupt.
    marshaller.unmarshal(&bytes)?;

    match output {
        Some(output) => {
            std::fs::write(&output, &bytes)?;
            info!(
                "Wrote {} prefixes to {}",
                source.entries().len(),
                output.display()
            );
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
