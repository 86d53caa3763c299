//! State module for tracking crawl progress
//!
//! This module provides state management for domains during the crawl process.
//!
//! # Components
//!
//! - `CrawlState`: Partitions known domains into frontier, in-flight and visited
//! - `VisitOutcome`: How a visited domain concluded (fetched, failed, skipped)
//! - `Counters`: Run totals reported in status lines and the summary

mod counters;
mod crawl_state;

// Re-export main types
pub use counters::Counters;
pub use crawl_state::{CrawlState, Discovery, DomainPhase, VisitOutcome};
