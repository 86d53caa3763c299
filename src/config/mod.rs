//! Configuration module for Fedimap
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and layering command line overrides on top of them.
//!
//! # Example
//!
//! ```no_run
//! use fedimap::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("fedimap.toml")).unwrap();
//! println!("Crawler will run {} fetches at once", config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, ExclusionConfig, HttpConfig, OutputConfig, Overrides,
    DEFAULT_PEERS_URL, DEFAULT_START_DOMAIN,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, resolve_config};
pub use validation::validate;
