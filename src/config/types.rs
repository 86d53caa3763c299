use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint every federated server exposes its peer list on
pub const DEFAULT_PEERS_URL: &str = "https://{domain}/api/v1/instance/peers";

/// Default domain the crawl starts from
pub const DEFAULT_START_DOMAIN: &str = "mastodon.social";

/// Main configuration structure for Fedimap
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub exclusion: ExclusionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Domain the crawl is seeded with
    #[serde(rename = "start-domain")]
    pub start_domain: String,

    /// Maximum number of peer fetches in flight at once
    pub concurrency: u32,

    /// Per-fetch timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Ignore cached peer lists and fetch everything again
    pub discard: bool,

    /// How long the crawl must stay idle before it is considered finished (milliseconds)
    #[serde(rename = "debounce-ms")]
    pub debounce_ms: u64,

    /// Interval between status lines (milliseconds)
    #[serde(rename = "status-interval-ms")]
    pub status_interval_ms: u64,

    /// How long in-flight fetches may run after a stop request (seconds)
    #[serde(rename = "grace-period-secs")]
    pub grace_period_secs: u64,

    /// Optional wall-clock deadline for the whole crawl (seconds)
    #[serde(rename = "demo-seconds")]
    pub demo_seconds: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4);

        Self {
            start_domain: DEFAULT_START_DOMAIN.to_string(),
            concurrency: cpus * 8,
            timeout_secs: 30,
            discard: false,
            debounce_ms: 5_000,
            status_interval_ms: 1_000,
            grace_period_secs: 10,
            demo_seconds: None,
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.demo_seconds.map(Duration::from_secs)
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,

    /// Peers endpoint template; `{domain}` is replaced with the domain being fetched
    #[serde(rename = "peers-url")]
    pub peers_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            crawler_name: "fedimap".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            peers_url: DEFAULT_PEERS_URL.to_string(),
        }
    }
}

impl HttpConfig {
    /// Formats the user agent: `Name/Version (+ContactURL)`
    pub fn user_agent(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }

    /// Builds the peers endpoint URL for a domain
    pub fn peers_url_for(&self, domain: &str) -> String {
        self.peers_url.replace("{domain}", domain)
    }
}

/// Exclusion rule source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Pattern file; the built-in list is used when absent
    pub file: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving the log streams, summary and node cache
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl OutputConfig {
    /// Directory holding one cache entry (and possibly an error marker) per domain
    pub fn cache_dir(&self) -> PathBuf {
        self.directory.join("peers")
    }
}

/// Values given on the command line, applied on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub start_domain: Option<String>,
    pub concurrency: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub discard: bool,
    pub exclude_file: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    pub demo_seconds: Option<u64>,
}

impl Overrides {
    /// Applies every override that was actually given
    pub fn apply(&self, config: &mut Config) {
        if let Some(domain) = &self.start_domain {
            config.crawler.start_domain = domain.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.crawler.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_secs {
            config.crawler.timeout_secs = timeout;
        }
        if self.discard {
            config.crawler.discard = true;
        }
        if let Some(file) = &self.exclude_file {
            config.exclusion.file = Some(file.clone());
        }
        if let Some(dir) = &self.directory {
            config.output.directory = dir.clone();
        }
        if let Some(seconds) = self.demo_seconds {
            config.crawler.demo_seconds = Some(seconds);
        }
    }
}
