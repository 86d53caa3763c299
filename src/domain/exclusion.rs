//! Exclusion rules for domains that must never be fetched
//!
//! Rules are loaded once at startup and are read-only afterwards. A domain is
//! excluded when any rule matches it. Regular expression rules are searched
//! anywhere in the domain (not anchored), so `blocked\.cf` also matches
//! `x.blocked.cf.example`; rules written as `suffix:<text>` only match at the
//! end of the domain.

use crate::ConfigError;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::path::Path;

/// Prefix marking a literal suffix rule in a pattern file
const SUFFIX_PREFIX: &str = "suffix:";

/// Built-in rule list, used when no pattern file is configured
const BUILTIN_PATTERNS: &str = include_str!("default_exclusions.txt");

/// A single compiled exclusion rule
#[derive(Debug, Clone)]
pub enum ExclusionRule {
    /// Case-insensitive regular expression, matched anywhere in the domain
    Regex(Regex),
    /// Lower-cased literal the domain must end with
    Suffix(String),
}

impl ExclusionRule {
    /// Compiles one pattern line
    ///
    /// # Returns
    ///
    /// * `Ok(ExclusionRule)` - The compiled rule
    /// * `Err(String)` - Why the pattern was rejected
    pub fn parse(pattern: &str) -> Result<Self, String> {
        if let Some(suffix) = pattern.strip_prefix(SUFFIX_PREFIX) {
            let suffix = suffix.trim();
            if suffix.is_empty() {
                return Err("empty suffix rule".to_string());
            }
            return Ok(Self::Suffix(suffix.to_lowercase()));
        }

        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self::Regex)
            .map_err(|e| e.to_string())
    }

    /// Returns true if this rule matches the domain
    pub fn matches(&self, domain: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(domain),
            Self::Suffix(suffix) => domain.to_lowercase().ends_with(suffix.as_str()),
        }
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "{}", re.as_str()),
            Self::Suffix(suffix) => write!(f, "{}{}", SUFFIX_PREFIX, suffix),
        }
    }
}

/// Ordered set of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    /// Loads the rules from a file, or the built-in list when `path` is `None`
    ///
    /// # Returns
    ///
    /// * `Ok(ExclusionFilter)` - All rules compiled
    /// * `Err(ConfigError)` - The file could not be read or a rule failed to compile
    pub fn from_source(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                tracing::debug!("Loading exclusion rules from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_patterns(&content)
            }
            None => {
                tracing::debug!("Loading built-in exclusion rules");
                Self::builtin()
            }
        }
    }

    /// Compiles the built-in rule list
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_patterns(BUILTIN_PATTERNS)
    }

    /// Compiles rules from pattern text, one pattern per line
    ///
    /// Blank lines and lines starting with `#` are ignored. A single bad line
    /// fails the whole load.
    ///
    /// # Example
    ///
    /// ```
    /// use fedimap::domain::ExclusionFilter;
    ///
    /// let filter = ExclusionFilter::from_patterns("# spam\nsuffix:.blocked.cf\n").unwrap();
    /// assert!(filter.is_excluded("c.blocked.cf"));
    /// assert!(!filter.is_excluded("b.example"));
    /// ```
    pub fn from_patterns(text: &str) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let rule = ExclusionRule::parse(line).map_err(|reason| {
                ConfigError::InvalidPattern(format!(
                    "line {}: '{}': {}",
                    index + 1,
                    line,
                    reason
                ))
            })?;
            tracing::trace!("Exclusion rule: {}", rule);
            rules.push(rule);
        }

        Ok(Self { rules })
    }

    /// Returns true if any rule matches the domain
    pub fn is_excluded(&self, domain: &str) -> bool {
        self.matching_rule(domain).is_some()
    }

    /// Returns the first rule that matches the domain
    pub fn matching_rule(&self, domain: &str) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| rule.matches(domain))
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
