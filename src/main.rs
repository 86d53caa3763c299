//! Fedimap main entry point
//!
//! This is the command-line interface for the Fedimap peer-discovery crawler.

use anyhow::Context;
use clap::Parser;
use fedimap::config::{resolve_config, Config, Overrides};
use fedimap::crawler::{run_crawl, StopHandle};
use fedimap::domain::ExclusionFilter;
use fedimap::graph::{PeerGraph, EDGES_FILE, LABELS_FILE};
use fedimap::storage::FsNodeStore;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Fedimap: a federated network topology crawler
///
/// Fedimap starts from one server, asks it which peers it federates with,
/// and keeps following newly seen peers until none are left. Peer lists are
/// cached on disk and can be turned into a graph with --generate.
#[derive(Parser, Debug)]
#[command(name = "fedimap")]
#[command(version)]
#[command(about = "A federated network topology crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Domain to start crawling from
    #[arg(short = 's', long, value_name = "DOMAIN")]
    start_domain: Option<String>,

    /// Maximum number of concurrent fetches
    #[arg(short = 'n', long, value_name = "N")]
    num_workers: Option<u32>,

    /// Per-fetch timeout in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Ignore cached peer lists and fetch everything again
    #[arg(long)]
    discard: bool,

    /// File with exclusion patterns (one per line)
    #[arg(short = 'e', long, value_name = "FILE")]
    exclude_file: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Stop the crawl after this many seconds
    #[arg(long, value_name = "SECONDS")]
    demo_seconds: Option<u64>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show the effective configuration and exclusion rules without crawling
    #[arg(long, conflicts_with = "generate")]
    dry_run: bool,

    /// Build the peer graph from the node cache instead of crawling
    #[arg(long, conflicts_with = "dry_run")]
    generate: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            start_domain: self.start_domain.clone(),
            concurrency: self.num_workers,
            timeout_secs: self.timeout,
            discard: self.discard,
            exclude_file: self.exclude_file.clone(),
            directory: self.dir.clone(),
            demo_seconds: self.demo_seconds,
        }
    }
}

/// Crawl stopped before the frontier was exhausted
const EXIT_INCOMPLETE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
    }
    let (config, config_hash) = resolve_config(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;
    tracing::debug!("Configuration hash: {}", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &config_hash)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.generate {
        handle_generate(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_crawl(&config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fedimap=info,warn"),
            1 => EnvFilter::new("fedimap=debug,info"),
            _ => EnvFilter::new("fedimap=trace,debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings without crawling
fn handle_dry_run(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let filter = ExclusionFilter::from_source(config.exclusion.file.as_deref())
        .context("Failed to load exclusion rules")?;

    println!("=== Fedimap Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Start domain: {}", config.crawler.start_domain);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Discard cache: {}", config.crawler.discard);
    println!("  Debounce: {}ms", config.crawler.debounce_ms);
    println!("  Grace period: {}s", config.crawler.grace_period_secs);
    match config.crawler.demo_seconds {
        Some(seconds) => println!("  Deadline: {}s", seconds),
        None => println!("  Deadline: none"),
    }

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent());
    println!("  Peers URL: {}", config.http.peers_url);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory.display());
    println!("  Node cache: {}", config.output.cache_dir().display());

    match &config.exclusion.file {
        Some(path) => println!("\nExclusion Rules ({}, from {}):", filter.len(), path.display()),
        None => println!("\nExclusion Rules ({}, built-in):", filter.len()),
    }
    for rule in filter.rules() {
        println!("  - {}", rule);
    }

    println!("\n✓ Configuration is valid (hash {})", config_hash);

    Ok(())
}

/// Handles the --generate mode: writes the peer graph built from the node cache
fn handle_generate(config: &Config) -> anyhow::Result<()> {
    let cache_dir = config.output.cache_dir();
    let store = FsNodeStore::open(&cache_dir)
        .with_context(|| format!("Failed to open node cache {}", cache_dir.display()))?;

    tracing::info!("Building peer graph from {}", cache_dir.display());
    let graph = PeerGraph::from_store(&store).context("Failed to read node cache")?;

    let labels = config.output.directory.join(LABELS_FILE);
    let edges = config.output.directory.join(EDGES_FILE);
    graph
        .write_labels(&labels)
        .with_context(|| format!("Failed to write {}", labels.display()))?;
    graph
        .write_edges(&edges)
        .with_context(|| format!("Failed to write {}", edges.display()))?;

    println!(
        "✓ Wrote {} nodes to {} and {} edges to {}",
        graph.node_count(),
        labels.display(),
        graph.edge_count(),
        edges.display()
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<ExitCode> {
    let stop = StopHandle::new();

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping crawl");
                signal_stop.stop();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    let report = run_crawl(config, config_hash, stop)
        .await
        .context("Crawl failed")?;

    if report.is_complete() {
        tracing::info!("Crawl completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(
            "Crawl incomplete ({}): {} domains in frontier, {} abandoned in flight",
            report.completion,
            report.frontier_remaining.len(),
            report.in_flight_abandoned.len()
        );
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}
