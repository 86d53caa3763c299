//! Periodic progress line

use crate::state::{Counters, CrawlState};
use std::fmt;
use std::time::Duration;

/// Snapshot of crawl progress
///
/// Rendered as
/// `d:<nodes> e:<errors> s:<skips> f:<frontier> i:<in-flight> v:<visited> l:<links> t:HH:MM:SS da:<avg-ms> to:<timeouts>`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub nodes: u64,
    pub errors: u64,
    pub skips: u64,
    pub frontier: usize,
    pub in_flight: usize,
    pub visited: usize,
    pub links: u64,
    pub elapsed: Duration,
    pub average_ms: f64,
    pub timeouts: u64,
}

impl StatusLine {
    pub fn capture(counters: &Counters, state: &CrawlState, elapsed: Duration) -> Self {
        Self {
            nodes: counters.nodes,
            errors: counters.errors,
            skips: counters.skips,
            frontier: state.frontier_len(),
            in_flight: state.in_flight_len(),
            visited: state.visited_len(),
            links: counters.links,
            elapsed,
            average_ms: counters.average_fetch_ms(),
            timeouts: counters.timeouts,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "d:{} e:{} s:{} f:{} i:{} v:{} l:{} t:{} da:{:.0} to:{}",
            self.nodes,
            self.errors,
            self.skips,
            self.frontier,
            self.in_flight,
            self.visited,
            self.links,
            format_elapsed(self.elapsed),
            self.average_ms,
            self.timeouts
        )
    }
}

/// Formats a duration as `HH:MM:SS`; hours are not wrapped at 24
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
