//! Markdown run summary and leftover frontier dump
//!
//! Both are written once, after the crawl has stopped and the log streams
//! have been closed.

use crate::config::Config;
use crate::crawler::CrawlReport;
use crate::output::status::format_elapsed;
use crate::state::Counters;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const SUMMARY_FILE: &str = "crawl-summary.md";
pub const FRONTIER_FILE: &str = "crawl.frontier";

/// Everything recorded about a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub completion: String,
    pub complete: bool,
    pub config_hash: String,
    pub config: Config,
    pub counters: Counters,
    pub frontier_remaining: usize,
    pub in_flight_abandoned: usize,
    pub exclusion_rules: Vec<String>,
}

impl RunSummary {
    pub fn new(
        report: &CrawlReport,
        config: &Config,
        config_hash: &str,
        exclusion_rules: Vec<String>,
    ) -> Self {
        Self {
            started_at: report.started_at,
            finished_at: report.finished_at,
            completion: report.completion.to_string(),
            complete: report.is_complete(),
            config_hash: config_hash.to_string(),
            config: config.clone(),
            counters: report.counters.clone(),
            frontier_remaining: report.frontier_remaining.len(),
            in_flight_abandoned: report.in_flight_abandoned.len(),
            exclusion_rules,
        }
    }
}

/// Writes the markdown summary to `output_path`
pub fn write_markdown_summary(summary: &RunSummary, output_path: &Path) -> io::Result<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;
    file.sync_all()?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Fedimap Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Finished**: {}\n",
        summary.finished_at.to_rfc3339()
    ));
    let duration = (summary.finished_at - summary.started_at)
        .to_std()
        .unwrap_or_default();
    md.push_str(&format!("- **Duration**: {}\n", format_elapsed(duration)));
    md.push_str(&format!("- **Completion**: {}\n", summary.completion));
    md.push_str(&format!(
        "- **Complete**: {}\n",
        if summary.complete { "yes" } else { "no" }
    ));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    let crawler = &summary.config.crawler;
    md.push_str("## Configuration\n\n");
    md.push_str("| Setting | Value |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Start domain | {} |\n", crawler.start_domain));
    md.push_str(&format!("| Concurrency | {} |\n", crawler.concurrency));
    md.push_str(&format!("| Timeout | {}s |\n", crawler.timeout_secs));
    md.push_str(&format!("| Discard cache | {} |\n", crawler.discard));
    md.push_str(&format!("| Debounce | {}ms |\n", crawler.debounce_ms));
    match crawler.demo_seconds {
        Some(secs) => md.push_str(&format!("| Deadline | {}s |\n", secs)),
        None => md.push_str("| Deadline | none |\n"),
    }
    md.push_str(&format!(
        "| Peers URL | {} |\n",
        summary.config.http.peers_url
    ));
    md.push_str(&format!(
        "| User agent | {} |\n",
        summary.config.http.user_agent()
    ));
    md.push_str(&format!(
        "| Output directory | {} |\n\n",
        summary.config.output.directory.display()
    ));

    let counters = &summary.counters;
    md.push_str("## Counters\n\n");
    md.push_str("| Counter | Value |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Nodes | {} |\n", counters.nodes));
    md.push_str(&format!("| Links | {} |\n", counters.links));
    md.push_str(&format!("| Errors | {} |\n", counters.errors));
    md.push_str(&format!("| Timeouts | {} |\n", counters.timeouts));
    md.push_str(&format!("| Skips | {} |\n", counters.skips));
    md.push_str(&format!("| Downloads | {} |\n", counters.downloads));
    md.push_str(&format!("| Cache hits | {} |\n", counters.cache_hits));
    md.push_str(&format!(
        "| Average fetch | {:.1}ms |\n\n",
        counters.average_fetch_ms()
    ));

    if !summary.complete {
        md.push_str("## Unfinished Work\n\n");
        md.push_str(&format!(
            "- **Frontier remaining**: {}\n",
            summary.frontier_remaining
        ));
        md.push_str(&format!(
            "- **In flight at stop**: {}\n",
            summary.in_flight_abandoned
        ));
        md.push_str(&format!("- **Listed in**: `{}`\n\n", FRONTIER_FILE));
    }

    md.push_str("## Exclusion Rules\n\n");
    if summary.exclusion_rules.is_empty() {
        md.push_str("None\n");
    } else {
        md.push_str(&format!("Total: {}\n\n", summary.exclusion_rules.len()));
        for rule in &summary.exclusion_rules {
            md.push_str(&format!("- `{}`\n", rule));
        }
    }

    md
}

/// Writes the domains left unvisited by an incomplete run, one per line
///
/// Frontier domains come first, then the ones abandoned in flight.
pub fn write_frontier(report: &CrawlReport, output_path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(output_path)?);

    for domain in report
        .frontier_remaining
        .iter()
        .chain(report.in_flight_abandoned.iter())
    {
        writeln!(writer, "{}", domain)?;
    }

    writer.flush()?;
    Ok(())
}
