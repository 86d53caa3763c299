//! Crawler module for peer discovery
//!
//! This module contains the core crawling logic, including:
//! - Fetching peer lists over HTTP, through error markers and the node cache
//! - Frontier scheduling under a concurrency budget
//! - Overall crawl coordination, termination and shutdown

mod coordinator;
mod fetcher;
#[cfg(test)]
pub(crate) mod mock;
mod scheduler;

pub use coordinator::{Completion, Coordinator, CoordinatorSettings, CrawlReport, StopHandle};
pub use fetcher::{
    build_http_client, parse_peers, FailureKind, FetchOrigin, FetchOutcome, FetchResult, Fetcher,
    HttpPeerSource, PeerSource,
};
pub use scheduler::{Applied, ScheduledFetch, Scheduler, Seeded, Visit};

use crate::config::Config;
use crate::domain::ExclusionFilter;
use crate::output::{
    write_frontier, write_markdown_summary, OutputSink, RunSummary, FRONTIER_FILE, SUMMARY_FILE,
};
use crate::storage::FsNodeStore;
use crate::FedimapError;
use std::io::ErrorKind;
use std::sync::Arc;

/// Runs a complete crawl against the configured peers endpoint
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the exclusion rules and open the node cache
/// 2. Build the HTTP client
/// 3. Seed the frontier with the start domain
/// 4. Fetch peers until the crawl finishes, is stopped, or hits its deadline
/// 5. Write the run summary, plus the leftover frontier if incomplete
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration, recorded in the summary
/// * `stop` - Stop flag, typically triggered by Ctrl+C
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran; check `is_complete()` for the outcome
/// * `Err(FedimapError)` - Setup or output failed
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    stop: StopHandle,
) -> Result<CrawlReport, FedimapError> {
    let source = Arc::new(HttpPeerSource::new(&config.http)?);
    run_crawl_with(config, config_hash, source, stop).await
}

/// Runs a complete crawl against any [`PeerSource`]
pub async fn run_crawl_with(
    config: &Config,
    config_hash: &str,
    source: Arc<dyn PeerSource>,
    stop: StopHandle,
) -> Result<CrawlReport, FedimapError> {
    let filter = ExclusionFilter::from_source(config.exclusion.file.as_deref())?;
    let rules: Vec<String> = filter.rules().iter().map(ToString::to_string).collect();
    tracing::info!("Loaded {} exclusion rules", rules.len());

    let cache_dir = config.output.cache_dir();
    let store = Arc::new(FsNodeStore::open(&cache_dir)?);
    tracing::info!("Node cache: {}", cache_dir.display());

    let fetcher = Fetcher::new(
        source,
        store,
        config.crawler.timeout(),
        config.crawler.discard,
    );

    let output_dir = &config.output.directory;
    let sink = OutputSink::create(output_dir).await?;

    let mut scheduler = Scheduler::new(filter, config.crawler.concurrency as usize);
    match scheduler.seed(&config.crawler.start_domain) {
        Seeded::Queued(domain) => tracing::info!("Starting from {}", domain),
        Seeded::Excluded(domain) => {
            tracing::warn!("Start domain {} is excluded, nothing to crawl", domain);
            sink.skip(&domain).await;
        }
        Seeded::Ignored => tracing::warn!(
            "Start domain {:?} is not a valid domain, nothing to crawl",
            config.crawler.start_domain
        ),
    }

    let coordinator = Coordinator::new(
        scheduler,
        fetcher,
        sink,
        CoordinatorSettings::from_config(&config.crawler),
        stop,
    );
    let report = coordinator.run().await?;

    let summary = RunSummary::new(&report, config, config_hash, rules);
    write_markdown_summary(&summary, &output_dir.join(SUMMARY_FILE))?;

    let frontier_path = output_dir.join(FRONTIER_FILE);
    if report.is_complete() {
        match std::fs::remove_file(&frontier_path) {
            Ok(()) => tracing::debug!("Removed stale {}", frontier_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    } else {
        write_frontier(&report, &frontier_path)?;
        tracing::info!(
            "Crawl incomplete: {} domains left, listed in {}",
            report.frontier_remaining.len() + report.in_flight_abandoned.len(),
            frontier_path.display()
        );
    }

    Ok(report)
}
