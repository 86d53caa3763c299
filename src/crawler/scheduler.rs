//! Scheduler for managing the crawl frontier and the concurrency budget
//!
//! This module handles:
//! - Frontier / in-flight / visited bookkeeping through [`CrawlState`]
//! - Global concurrency limiting via a semaphore
//! - Applying fetch results: counting, exclusion, and peer discovery

use crate::crawler::{FailureKind, FetchOrigin, FetchOutcome, FetchResult};
use crate::domain::{normalize_domain, ExclusionFilter};
use crate::state::{Counters, CrawlState, Discovery, VisitOutcome};
use crate::FedimapError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A scheduled fetch with a semaphore permit
///
/// The permit must be held until the fetch result has been applied.
pub struct ScheduledFetch {
    /// The domain to fetch
    pub domain: String,

    /// The semaphore permit for this fetch
    pub permit: OwnedSemaphorePermit,
}

/// What happened to the seed domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seeded {
    Queued(String),
    Excluded(String),
    /// The input does not normalize to a domain, or the domain is already known
    Ignored,
}

/// How an applied fetch concluded
#[derive(Debug, Clone, PartialEq)]
pub enum Visit {
    Fetched {
        elapsed: Duration,
        origin: FetchOrigin,
    },
    Failed {
        kind: FailureKind,
        message: String,
        /// False when the failure came from an existing error marker
        persist_marker: bool,
    },
}

/// Everything the caller needs to record after applying one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub domain: String,
    pub visit: Visit,

    /// Peers that entered the frontier because of this fetch
    pub discovered: Vec<String>,

    /// Excluded peers recorded for the first time
    pub skipped: Vec<String>,
}

/// Scheduler manages the frontier and the concurrency budget
///
/// The scheduler is owned by a single task; nothing in here is shared.
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    global_semaphore: Arc<Semaphore>,

    /// Frontier / in-flight / visited partition
    state: CrawlState,

    counters: Counters,

    filter: ExclusionFilter,

    concurrency: usize,
}

impl Scheduler {
    /// Creates a new scheduler with an empty frontier
    ///
    /// # Arguments
    ///
    /// * `filter` - Exclusion rules applied to every discovered peer
    /// * `concurrency` - Maximum number of fetches in flight
    pub fn new(filter: ExclusionFilter, concurrency: usize) -> Self {
        Self {
            global_semaphore: Arc::new(Semaphore::new(concurrency)),
            state: CrawlState::new(),
            counters: Counters::new(),
            filter,
            concurrency,
        }
    }

    /// Puts the start domain into the frontier, unless it is excluded
    pub fn seed(&mut self, raw: &str) -> Seeded {
        let Some(domain) = normalize_domain(raw) else {
            return Seeded::Ignored;
        };

        if self.filter.is_excluded(&domain) {
            if self.state.record_skip(&domain) {
                self.counters.skips += 1;
                return Seeded::Excluded(domain);
            }
            return Seeded::Ignored;
        }

        match self.state.discover(&domain) {
            Discovery::New => Seeded::Queued(domain),
            Discovery::AlreadySeen => Seeded::Ignored,
        }
    }

    /// Gets the next domain to fetch
    ///
    /// Never waits: returns `None` when the frontier is empty or every permit
    /// is taken.
    ///
    /// # Returns
    ///
    /// * `Some(ScheduledFetch)` - A domain now in flight, with its permit
    /// * `None` - Nothing can be dispatched right now
    pub fn next_dispatch(&mut self) -> Option<ScheduledFetch> {
        if self.state.frontier_len() == 0 {
            return None;
        }

        let permit = self.global_semaphore.clone().try_acquire_owned().ok()?;
        let domain = self.state.dispatch()?;
        tracing::trace!("Dispatching {}", domain);

        Some(ScheduledFetch { domain, permit })
    }

    /// Applies a fetch result to an in-flight domain
    ///
    /// On success every peer entry is considered: null, blank and
    /// unnormalizable entries are ignored, excluded peers are recorded as
    /// skips, and unseen peers enter the frontier.
    pub fn apply(&mut self, domain: &str, outcome: FetchOutcome) -> Result<Applied, FedimapError> {
        let FetchOutcome { result, origin } = outcome;

        match result {
            FetchResult::Peers { peers, elapsed } => {
                self.state.complete(domain, VisitOutcome::Fetched)?;

                self.counters.nodes += 1;
                match origin {
                    FetchOrigin::Network => {
                        self.counters.downloads += 1;
                        self.counters.total_fetch_time += elapsed;
                    }
                    FetchOrigin::Cache => self.counters.cache_hits += 1,
                    FetchOrigin::ErrorMarker => {}
                }

                let mut discovered = Vec::new();
                let mut skipped = Vec::new();
                for peer in peers.iter().flatten() {
                    let Some(peer) = normalize_domain(peer) else {
                        continue;
                    };

                    if let Some(rule) = self.filter.matching_rule(&peer) {
                        if self.state.record_skip(&peer) {
                            tracing::debug!("Skipping {} (matches {})", peer, rule);
                            self.counters.skips += 1;
                            skipped.push(peer);
                        }
                        continue;
                    }

                    if self.state.discover(&peer) == Discovery::New {
                        self.counters.links += 1;
                        discovered.push(peer);
                    }
                }

                Ok(Applied {
                    domain: domain.to_string(),
                    visit: Visit::Fetched { elapsed, origin },
                    discovered,
                    skipped,
                })
            }
            FetchResult::Failure { kind, message } => {
                self.state.complete(domain, VisitOutcome::Failed(kind))?;

                self.counters.errors += 1;
                if kind == FailureKind::Timeout {
                    self.counters.timeouts += 1;
                }

                Ok(Applied {
                    domain: domain.to_string(),
                    visit: Visit::Failed {
                        kind,
                        message,
                        persist_marker: origin != FetchOrigin::ErrorMarker,
                    },
                    discovered: Vec::new(),
                    skipped: Vec::new(),
                })
            }
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the number of free worker slots
    pub fn available_permits(&self) -> usize {
        self.global_semaphore.available_permits()
    }

    /// True when the frontier and the in-flight set are both empty
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }
}
