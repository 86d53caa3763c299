//! Output module for crawl logs, progress and summaries
//!
//! This module handles:
//! - Streaming visits, skips, errors and fetch timings to append-only files
//! - Formatting the periodic status line
//! - Writing the markdown run summary and the leftover frontier

mod sink;
mod status;
mod summary;

pub use sink::{OutputSink, ERRORS_FILE, SKIPS_FILE, TIMES_FILE, VISITS_FILE};
pub use status::{format_elapsed, StatusLine};
pub use summary::{
    format_markdown_summary, write_frontier, write_markdown_summary, RunSummary, FRONTIER_FILE,
    SUMMARY_FILE,
};
