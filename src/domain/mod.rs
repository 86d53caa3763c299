//! Domain handling module for Fedimap
//!
//! This module provides peer-entry normalization and the exclusion filter
//! deciding which domains are never fetched.

mod exclusion;
mod normalize;

// Re-export main types and functions
pub use exclusion::{ExclusionFilter, ExclusionRule};
pub use normalize::normalize_domain;
