use crate::config::types::{Config, CrawlerConfig, HttpConfig, OutputConfig};
use crate::domain::normalize_domain;
use crate::ConfigError;
use url::Url;

/// Largest accepted concurrency budget
const MAX_CONCURRENCY: u32 = 4096;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if normalize_domain(&config.start_domain).is_none() {
        return Err(ConfigError::Validation(format!(
            "start_domain must be a non-empty host name, got '{}'",
            config.start_domain
        )));
    }

    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.status_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "status_interval_ms must be >= 100ms, got {}ms",
            config.status_interval_ms
        )));
    }

    if config.demo_seconds == Some(0) {
        return Err(ConfigError::Validation(
            "demo_seconds must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    validate_peers_url(&config.peers_url)
}

/// Validates the peers endpoint template
fn validate_peers_url(template: &str) -> Result<(), ConfigError> {
    if !template.contains("{domain}") {
        return Err(ConfigError::Validation(format!(
            "peers_url must contain a {{domain}} placeholder, got '{}'",
            template
        )));
    }

    let sample = template.replace("{domain}", "example.com");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid peers_url '{}': {}", template, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "peers_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}
