//! Run-scoped crawl totals

use std::time::Duration;

/// Monotonic counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    /// Domains whose peers were retrieved
    pub nodes: u64,

    /// Peers that entered the frontier for the first time
    pub links: u64,

    /// Failed fetches, error-marker hits included
    pub errors: u64,

    /// Distinct excluded domains
    pub skips: u64,

    /// Failures classified as timeouts
    pub timeouts: u64,

    /// Peer lists retrieved over the network
    pub downloads: u64,

    /// Peer lists served by the node cache
    pub cache_hits: u64,

    /// Sum of the network fetch times; cache hits are not timed
    pub total_fetch_time: Duration,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean download time in milliseconds, zero before the first download
    pub fn average_fetch_ms(&self) -> f64 {
        if self.downloads == 0 {
            return 0.0;
        }
        self.total_fetch_time.as_secs_f64() * 1000.0 / self.downloads as f64
    }
}
