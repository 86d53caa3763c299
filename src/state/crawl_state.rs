//! Frontier / in-flight / visited partition
//!
//! Every domain the crawl has heard of lives in exactly one phase. Moves only go
//! forward: `Frontier -> InFlight -> Visited`, or straight to `Visited` for
//! excluded domains.

use crate::crawler::FailureKind;
use crate::FedimapError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// How a visit concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitOutcome {
    /// Peers were retrieved from the network or the node cache
    Fetched,

    /// The fetch failed permanently
    Failed(FailureKind),

    /// The domain matched an exclusion rule and was never fetched
    Skipped,
}

impl VisitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Current phase of a known domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainPhase {
    /// Discovered, waiting for a worker slot
    Frontier,

    /// Dispatched, fetch not yet applied
    InFlight,

    /// Terminal; never fetched again in this run
    Visited(VisitOutcome),
}

impl DomainPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Visited(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Frontier => "frontier",
            Self::InFlight => "in-flight",
            Self::Visited(_) => "visited",
        }
    }
}

impl fmt::Display for DomainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of offering a domain to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// First sighting; the domain entered the frontier
    New,

    /// The domain is already in some phase; nothing changed
    AlreadySeen,
}

/// Phase bookkeeping for one crawl run
///
/// Frontier order is first-in first-out, which keeps the traversal roughly
/// breadth-first, but callers must not rely on any particular order.
#[derive(Debug, Default)]
pub struct CrawlState {
    phases: HashMap<String, DomainPhase>,
    frontier: VecDeque<String>,
    in_flight: HashSet<String>,
    visited: usize,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a domain to the frontier
    ///
    /// # Returns
    ///
    /// * `Discovery::New` - The domain was unseen and is now in the frontier
    /// * `Discovery::AlreadySeen` - The domain was already known
    pub fn discover(&mut self, domain: &str) -> Discovery {
        if self.phases.contains_key(domain) {
            return Discovery::AlreadySeen;
        }

        self.phases.insert(domain.to_string(), DomainPhase::Frontier);
        self.frontier.push_back(domain.to_string());
        Discovery::New
    }

    /// Moves an unseen, excluded domain straight to `Visited(Skipped)`
    ///
    /// Returns false if the domain was already known, so each excluded domain
    /// is recorded once.
    pub fn record_skip(&mut self, domain: &str) -> bool {
        if self.phases.contains_key(domain) {
            return false;
        }

        self.phases.insert(
            domain.to_string(),
            DomainPhase::Visited(VisitOutcome::Skipped),
        );
        self.visited += 1;
        true
    }

    /// Pops a frontier domain and marks it in flight
    pub fn dispatch(&mut self) -> Option<String> {
        let domain = self.frontier.pop_front()?;
        self.phases.insert(domain.clone(), DomainPhase::InFlight);
        self.in_flight.insert(domain.clone());
        Some(domain)
    }

    /// Retires an in-flight domain into `Visited`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The domain was in flight and is now visited
    /// * `Err(FedimapError::InvalidTransition)` - The domain was in any other phase
    pub fn complete(&mut self, domain: &str, outcome: VisitOutcome) -> Result<(), FedimapError> {
        match self.phases.get_mut(domain) {
            Some(phase @ DomainPhase::InFlight) => {
                *phase = DomainPhase::Visited(outcome);
                self.in_flight.remove(domain);
                self.visited += 1;
                Ok(())
            }
            other => Err(FedimapError::InvalidTransition {
                domain: domain.to_string(),
                from: other.map_or("unseen", |phase| phase.name()).to_string(),
                to: DomainPhase::Visited(outcome).name().to_string(),
            }),
        }
    }

    pub fn phase(&self, domain: &str) -> Option<DomainPhase> {
        self.phases.get(domain).copied()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited
    }

    /// Number of domains in any phase
    pub fn known_len(&self) -> usize {
        self.phases.len()
    }

    /// True when nothing is waiting and nothing is being fetched
    pub fn is_idle(&self) -> bool {
        self.frontier.is_empty() && self.in_flight.is_empty()
    }

    /// Frontier domains, sorted
    pub fn frontier_snapshot(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.frontier.iter().cloned().collect();
        domains.sort();
        domains
    }

    /// In-flight domains, sorted
    pub fn in_flight_snapshot(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.in_flight.iter().cloned().collect();
        domains.sort();
        domains
    }
}
