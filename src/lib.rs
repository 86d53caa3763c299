//! Fedimap: a federated network topology crawler
//!
//! This crate starts from one known server, asks it for the peers it federates
//! with, and keeps walking newly seen peers until nothing new turns up. Each
//! successful answer is cached on disk so the peer graph can be assembled later.

pub mod config;
pub mod crawler;
pub mod domain;
pub mod graph;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Fedimap operations
///
/// Individual fetch failures are not represented here: they are ordinary
/// [`crawler::FetchResult::Failure`] values and never abort a crawl.
#[derive(Debug, Error)]
pub enum FedimapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid state transition for {domain}: {from} -> {to}")]
    InvalidTransition {
        domain: String,
        from: String,
        to: String,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid exclusion pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Fedimap operations
pub type Result<T> = std::result::Result<T, FedimapError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Completion, CrawlReport, FailureKind, FetchResult};
pub use domain::{normalize_domain, ExclusionFilter};
pub use state::{CrawlState, VisitOutcome};
