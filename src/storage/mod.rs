//! Storage module for persisting crawl results
//!
//! This module handles the node cache, including:
//! - One compressed peer list per successfully fetched domain
//! - One error marker per domain whose fetch failed
//! - Enumerating cache entries for graph materialization

mod fs;
mod traits;

pub use fs::FsNodeStore;
pub use traits::{NodeStore, StorageError, StorageResult};

use crate::crawler::FailureKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A persisted peer list
///
/// Serialized as `{"domain": ..., "peers": [...], "elapsed": seconds}`.
/// Peers are kept exactly as the server reported them, nulls included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub domain: String,
    pub peers: Vec<Option<String>>,
    /// Fetch wall time in seconds
    pub elapsed: f64,
}

impl CacheEntry {
    pub fn new(domain: &str, peers: Vec<Option<String>>, elapsed: Duration) -> Self {
        Self {
            domain: domain.to_string(),
            peers,
            elapsed: elapsed.as_secs_f64(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.elapsed).unwrap_or_default()
    }
}

/// A persisted permanent fetch failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMarker {
    pub kind: FailureKind,
    pub detail: String,
}

impl ErrorMarker {
    /// Formats the marker file content: `<kind> <detail>`
    pub fn to_content(&self) -> String {
        format!("{} {}", self.kind, self.detail)
    }

    /// Parses marker file content, falling back to `unexpected` for unknown kinds
    pub fn from_content(content: &str) -> Self {
        let content = content.trim();
        let (head, rest) = content.split_once(' ').unwrap_or((content, ""));

        match FailureKind::from_str_opt(head) {
            Some(kind) => Self {
                kind,
                detail: rest.trim().to_string(),
            },
            None => Self {
                kind: FailureKind::Unexpected,
                detail: content.to_string(),
            },
        }
    }
}
