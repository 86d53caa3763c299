//! Peer list fetching
//!
//! This module handles everything needed to resolve one domain into its peer
//! list, including:
//! - Building the HTTP client with a proper user agent string
//! - Requesting the peers endpoint and classifying every failure
//! - Short-circuiting through error markers and the node cache

use crate::config::HttpConfig;
use crate::storage::{CacheEntry, NodeStore};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The server answered with a status other than 200
    HttpStatus,
    /// DNS, TCP or TLS failure
    Connection,
    /// The request exceeded the configured timeout
    Timeout,
    /// The body is not a JSON array of strings
    Decode,
    /// Anything else, including internal faults
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpStatus => "http-status",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Unexpected => "unexpected",
        }
    }

    /// Parses the textual form produced by [`FailureKind::as_str`]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "http-status" => Some(Self::HttpStatus),
            "connection" => Some(Self::Connection),
            "timeout" => Some(Self::Timeout),
            "decode" => Some(Self::Decode),
            "unexpected" => Some(Self::Unexpected),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::HttpStatus,
            Self::Connection,
            Self::Timeout,
            Self::Decode,
            Self::Unexpected,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving one domain
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// The peers exactly as the server listed them; entries may be null or blank
    Peers {
        peers: Vec<Option<String>>,
        elapsed: Duration,
    },

    /// The fetch failed and the domain will not be retried
    Failure { kind: FailureKind, message: String },
}

impl FetchResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Where a fetch result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// A persisted error marker; no network I/O happened
    ErrorMarker,
    /// The node cache; no network I/O happened
    Cache,
    /// A request to the peers endpoint
    Network,
}

/// A fetch result together with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub result: FetchResult,
    pub origin: FetchOrigin,
}

/// Source of peer lists
///
/// Implementations perform exactly one attempt per call and never retry.
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn get_peers(&self, domain: &str, timeout: Duration) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// Timeouts are applied per request, so the client itself only bounds the
/// connect phase.
///
/// # Example
///
/// ```no_run
/// use fedimap::config::HttpConfig;
/// use fedimap::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches peer lists from each domain's peers endpoint
#[derive(Debug, Clone)]
pub struct HttpPeerSource {
    client: Client,
    config: HttpConfig,
}

impl HttpPeerSource {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl PeerSource for HttpPeerSource {
    async fn get_peers(&self, domain: &str, timeout: Duration) -> FetchResult {
        let url = self.config.peers_url_for(domain);
        let start = Instant::now();

        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return FetchResult::failure(
                FailureKind::HttpStatus,
                format!("HTTP {}", status.as_u16()),
            );
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return classify_error(&e),
        };
        let elapsed = start.elapsed();

        match parse_peers(&body) {
            Ok(peers) => FetchResult::Peers { peers, elapsed },
            Err(e) => FetchResult::failure(FailureKind::Decode, e.to_string()),
        }
    }
}

/// Decodes a peers response body: a JSON array of strings or nulls
pub fn parse_peers(body: &[u8]) -> Result<Vec<Option<String>>, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Maps a client error onto the failure taxonomy
fn classify_error(e: &reqwest::Error) -> FetchResult {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        FailureKind::Connection
    } else if e.is_decode() {
        FailureKind::Decode
    } else {
        FailureKind::Unexpected
    };

    FetchResult::failure(kind, e.to_string())
}

/// Resolves a domain through error markers, the node cache and the network
///
/// # Request Flow
///
/// 1. An existing error marker yields its failure, without network I/O
/// 2. Unless `discard` is set, a valid cache entry yields its peers
/// 3. Otherwise one request goes to the [`PeerSource`]; successes are cached
///
/// Writing error markers is left to the caller.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn PeerSource>,
    store: Arc<dyn NodeStore>,
    timeout: Duration,
    discard: bool,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn PeerSource>,
        store: Arc<dyn NodeStore>,
        timeout: Duration,
        discard: bool,
    ) -> Self {
        Self {
            source,
            store,
            timeout,
            discard,
        }
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Resolves one domain
    pub async fn fetch(&self, domain: &str) -> FetchOutcome {
        let owned = domain.to_string();
        let marker = self
            .blocking(move |store| store.error_marker(&owned))
            .await
            .flatten();
        if let Some(marker) = marker {
            tracing::debug!("{} failed before ({}), not fetching", domain, marker.kind);
            return FetchOutcome {
                result: FetchResult::failure(
                    marker.kind,
                    format!("previously failed: {}", marker.detail),
                ),
                origin: FetchOrigin::ErrorMarker,
            };
        }

        if !self.discard {
            let owned = domain.to_string();
            let cached = self.blocking(move |store| store.load(&owned)).await.flatten();
            if let Some(entry) = cached {
                tracing::debug!("Cache hit for {}", domain);
                let elapsed = entry.elapsed();
                return FetchOutcome {
                    result: FetchResult::Peers {
                        peers: entry.peers,
                        elapsed,
                    },
                    origin: FetchOrigin::Cache,
                };
            }
        }

        let result = self.source.get_peers(domain, self.timeout).await;

        if let FetchResult::Peers { peers, elapsed } = &result {
            let entry = CacheEntry::new(domain, peers.clone(), *elapsed);
            let stored = self.blocking(move |store| store.store(&entry)).await;
            match stored {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::warn!("Failed to cache peers of {}: {}", domain, e),
                None => tracing::warn!("Cache write task for {} did not complete", domain),
            }
        }

        FetchOutcome {
            result,
            origin: FetchOrigin::Network,
        }
    }

    /// Runs a store operation on the blocking pool
    ///
    /// Returns `None` if the blocking task panicked or was cancelled.
    async fn blocking<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&dyn NodeStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || f(store.as_ref())).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Node cache task failed: {}", e);
                None
            }
        }
    }
}
