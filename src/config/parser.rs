use crate::config::types::{Config, Overrides};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use fedimap::config::load_config;
///
/// let config = load_config(Path::new("fedimap.toml")).unwrap();
/// println!("Starting from: {}", config.crawler.start_domain);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of a configuration
///
/// The hash covers the file content when a file was used, and the effective
/// values after command line overrides either way, so two runs with the same
/// hash crawled with the same settings.
pub fn compute_config_hash(file_content: Option<&str>, config: &Config) -> String {
    let mut hasher = Sha256::new();
    if let Some(content) = file_content {
        hasher.update(content.as_bytes());
    }
    hasher.update(format!("{:?}", config).as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves the effective configuration for a run
///
/// Reads `path` when given (otherwise starts from defaults), applies the
/// command line overrides, validates the result and hashes it.
///
/// # Returns
///
/// * `Ok((Config, String))` - The effective configuration and its hash
/// * `Err(ConfigError)` - Failed to load, parse or validate
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<(Config, String), ConfigError> {
    let (mut config, content) = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            (config, Some(content))
        }
        None => (Config::default(), None),
    };

    overrides.apply(&mut config);
    validate(&config)?;

    let hash = compute_config_hash(content.as_deref(), &config);
    Ok((config, hash))
}
