//! Storage traits and error types
//!
//! This module defines the trait interface for the node cache and
//! associated error types.

use crate::crawler::FailureKind;
use crate::storage::{CacheEntry, ErrorMarker};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for node cache implementations
///
/// Entries are keyed by domain. The crawler never dispatches the same domain
/// twice in a run, so implementations only need to be safe for concurrent
/// access to *different* domains.
pub trait NodeStore: Send + Sync {
    // ===== Peer Cache =====

    /// Loads the cached peers of a domain
    ///
    /// Anything that cannot be decoded counts as a miss, never as an error.
    ///
    /// # Returns
    ///
    /// * `Some(CacheEntry)` - A valid entry exists for exactly this domain
    /// * `None` - No entry, or the entry is unreadable
    fn load(&self, domain: &str) -> Option<CacheEntry>;

    /// Stores a successful fetch result
    ///
    /// A concurrent reader sees either the previous entry or the new one,
    /// never a partial write.
    fn store(&self, entry: &CacheEntry) -> StorageResult<()>;

    /// Lists every valid cache entry, sorted by domain
    fn entries(&self) -> StorageResult<Vec<CacheEntry>>;

    // ===== Error Markers =====

    /// Returns true if a previous fetch of this domain failed permanently
    fn has_error_marker(&self, domain: &str) -> bool;

    /// Reads the error marker of a domain back
    fn error_marker(&self, domain: &str) -> Option<ErrorMarker>;

    /// Persists a permanent fetch failure
    fn record_error_marker(
        &self,
        domain: &str,
        kind: FailureKind,
        detail: &str,
    ) -> StorageResult<()>;
}
