mod check;
mod discover;
mod scan;

use autoroute_core::RoutingConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "autoroute",
    version,
    about = "Prefix file tooling for repository proxies",
    long_about = "Autoroute discovers which path prefixes a repository serves and writes them as \
                  prefix files, so proxies can refuse requests for content a remote cannot have."
)]
pub struct Cli {
    /// JSON routing configuration. Defaults plus AUTOROUTE_* variables when absent.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a prefix file from a repository directory
    #[command(
        long_about = "Walks a repository directory like a hosted repository update would and prints \
                            the resulting prefix file, or writes it to --output."
    )]
    Scan {
        /// Repository root directory
        #[arg(value_name = "DIR")]
        path: PathBuf,
        /// Depth of the emitted prefixes (overrides the configured local scrape depth)
        #[arg(long)]
        depth: Option<usize>,
        /// Write the prefix file here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check request paths against a prefix file
    Check {
        /// Prefix file to load
        #[arg(value_name = "PREFIX_FILE")]
        prefix_file: PathBuf,
        /// Request paths to check
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },
    /// Run remote discovery against one or more remotes
    #[command(
        long_about = "Runs the remote discovery chain (remote prefix file, then scraping) the way a \
                            proxy update would and reports the outcome and discovered prefixes."
    )]
    Discover {
        /// Remote repository base URLs
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
        /// Print the discovered prefixes, not only the outcome
        #[arg(long)]
        entries: bool,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = autoroute_core::logging::init_logging("cli", true);

    let config = match &cli.config {
        Some(path) => RoutingConfig::from_json_file(path)?,
        None => RoutingConfig::from_env()?,
    };

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Scan {
            path,
            depth,
            output,
        } => rt.block_on(scan::run(config, path, depth, output)),
        Commands::Check { prefix_file, paths } => check::run(&config, &prefix_file, &paths),
        Commands::Discover { urls, entries } => rt.block_on(discover::run(config, urls, entries)),
    }
}
