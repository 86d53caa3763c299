//! Integration tests for the crawler
//!
//! These tests use wiremock to serve peers endpoints for several fake domains
//! (through the `{domain}` placeholder of the peers URL) and run the full crawl
//! cycle end-to-end against a temporary output directory.

use fedimap::config::{validate, Config, HttpConfig};
use fedimap::crawler::{
    run_crawl, Completion, FailureKind, FetchResult, HttpPeerSource, PeerSource, StopHandle,
};
use fedimap::graph::PeerGraph;
use fedimap::output::{ERRORS_FILE, FRONTIER_FILE, SKIPS_FILE, SUMMARY_FILE, TIMES_FILE, VISITS_FILE};
use fedimap::storage::{CacheEntry, FsNodeStore, NodeStore};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing every domain at the mock server
fn create_test_config(server_uri: &str, dir: &Path, start: &str) -> Config {
    let mut config = Config::default();
    config.crawler.start_domain = start.to_string();
    config.crawler.concurrency = 4;
    config.crawler.timeout_secs = 5;
    config.crawler.debounce_ms = 100;
    config.crawler.status_interval_ms = 100;
    config.crawler.grace_period_secs = 0;
    config.http.crawler_name = "TestBot".to_string();
    config.http.peers_url = format!("{}/{{domain}}/api/v1/instance/peers", server_uri);
    config.output.directory = dir.to_path_buf();
    validate(&config).expect("test config should be valid");
    config
}

fn peers_path(domain: &str) -> String {
    format!("/{}/api/v1/instance/peers", domain)
}

/// Serves `body` as the peer list of `domain`, expecting exactly `times` requests
async fn mount_peers(server: &MockServer, domain: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(peers_path(domain)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_response(server: &MockServer, domain: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(peers_path(domain)))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn read_lines(dir: &Path, name: &str) -> Vec<String> {
    let mut lines: Vec<String> = std::fs::read_to_string(dir.join(name))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

#[tokio::test]
async fn test_full_crawl_follows_and_filters_peers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_peers(
        &server,
        "a.example",
        json!(["b.example", "c.blocked.cf", "", null]),
        1,
    )
    .await;
    mount_peers(&server, "b.example", json!(["a.example", "d.example"]), 1).await;
    mount_peers(&server, "d.example", json!([]), 1).await;
    mount_peers(&server, "c.blocked.cf", json!([]), 0).await;

    let exclude_file = dir.path().join("exclude.txt");
    std::fs::write(&exclude_file, "# test rules\nsuffix:.blocked.cf\n").unwrap();
    let mut config = create_test_config(&server.uri(), dir.path(), "a.example");
    config.exclusion.file = Some(exclude_file);

    let report = run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    assert_eq!(report.completion, Completion::Finished);
    assert!(report.is_complete());
    assert_eq!(report.counters.nodes, 3);
    assert_eq!(report.counters.links, 2);
    assert_eq!(report.counters.skips, 1);
    assert_eq!(report.counters.errors, 0);
    assert_eq!(report.counters.downloads, 3);

    assert_eq!(
        read_lines(dir.path(), VISITS_FILE),
        vec!["a.example", "b.example", "d.example"]
    );
    assert_eq!(read_lines(dir.path(), SKIPS_FILE), vec!["c.blocked.cf"]);
    assert!(read_lines(dir.path(), ERRORS_FILE).is_empty());
    assert_eq!(read_lines(dir.path(), TIMES_FILE).len(), 3);
    assert!(dir.path().join(SUMMARY_FILE).exists());
    assert!(!dir.path().join(FRONTIER_FILE).exists());

    let store = FsNodeStore::open(&config.output.cache_dir()).unwrap();
    let entry = store.load("a.example").unwrap();
    assert_eq!(
        entry.peers,
        vec![
            Some("b.example".to_string()),
            Some("c.blocked.cf".to_string()),
            Some(String::new()),
            None,
        ]
    );
}

#[tokio::test]
async fn test_http_error_persists_marker() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_response(&server, "x.example", ResponseTemplate::new(503), 1).await;

    let config = create_test_config(&server.uri(), dir.path(), "x.example");
    let report = run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    // Individual failures never make the crawl incomplete
    assert!(report.is_complete());
    assert_eq!(report.counters.errors, 1);
    assert_eq!(report.counters.nodes, 0);
    assert_eq!(
        read_lines(dir.path(), ERRORS_FILE),
        vec!["x.example http-status HTTP 503"]
    );

    let store = FsNodeStore::open(&config.output.cache_dir()).unwrap();
    assert!(store.has_error_marker("x.example"));
    assert_eq!(
        store.error_marker("x.example").unwrap().kind,
        FailureKind::HttpStatus
    );
    assert!(store.load("x.example").is_none());
}

#[tokio::test]
async fn test_error_marker_prevents_refetch_in_next_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), "x.example");

    {
        let first = MockServer::start().await;
        mount_response(&first, "x.example", ResponseTemplate::new(404), 1).await;
        let mut first_config = config.clone();
        first_config.http.peers_url = format!("{}/{{domain}}/api/v1/instance/peers", first.uri());
        run_crawl(&first_config, "first", StopHandle::new())
            .await
            .unwrap();
    }

    // The domain recovered, but the marker is authoritative
    mount_peers(&server, "x.example", json!(["b.example"]), 0).await;
    let mut second = config.clone();
    second.crawler.discard = true;
    let report = run_crawl(&second, "second", StopHandle::new())
        .await
        .unwrap();

    assert_eq!(report.counters.errors, 1);
    assert_eq!(report.counters.nodes, 0);
    assert_eq!(report.counters.links, 0);
}

#[tokio::test]
async fn test_cache_hit_makes_no_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_peers(&server, "y.example", json!(["z.example"]), 0).await;
    mount_peers(&server, "z.example", json!([]), 1).await;

    let config = create_test_config(&server.uri(), dir.path(), "y.example");
    let store = FsNodeStore::open(&config.output.cache_dir()).unwrap();
    store
        .store(&CacheEntry::new(
            "y.example",
            vec![Some("z.example".to_string())],
            Duration::from_millis(80),
        ))
        .unwrap();

    let report = run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    assert_eq!(report.counters.nodes, 2);
    assert_eq!(report.counters.cache_hits, 1);
    assert_eq!(report.counters.downloads, 1);
    let times = read_lines(dir.path(), TIMES_FILE);
    assert_eq!(times.len(), 1);
    assert!(times[0].ends_with(" z.example"));
}

#[tokio::test]
async fn test_discard_refetches_cached_domains() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_peers(&server, "y.example", json!([]), 1).await;

    let mut config = create_test_config(&server.uri(), dir.path(), "y.example");
    config.crawler.discard = true;
    let store = FsNodeStore::open(&config.output.cache_dir()).unwrap();
    store
        .store(&CacheEntry::new(
            "y.example",
            vec![Some("old.example".to_string())],
            Duration::ZERO,
        ))
        .unwrap();

    let report = run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    assert_eq!(report.counters.downloads, 1);
    assert_eq!(report.counters.cache_hits, 0);
    assert!(store.load("y.example").unwrap().peers.is_empty());
}

#[tokio::test]
async fn test_deadline_leaves_frontier_on_disk() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_response(
        &server,
        "slow.example",
        ResponseTemplate::new(200)
            .set_body_json(json!([]))
            .set_delay(Duration::from_secs(4)),
        1,
    )
    .await;

    let mut config = create_test_config(&server.uri(), dir.path(), "slow.example");
    config.crawler.demo_seconds = Some(1);
    let report = run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    assert_eq!(report.completion, Completion::DeadlineReached);
    assert!(!report.is_complete());
    assert_eq!(
        read_lines(dir.path(), FRONTIER_FILE),
        vec!["slow.example"]
    );
    let summary = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
    assert!(summary.contains("- **Complete**: no"));
}

#[tokio::test]
async fn test_graph_from_crawled_cache() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_peers(&server, "a.example", json!(["b.example", "gone.example"]), 1).await;
    mount_peers(&server, "b.example", json!(["a.example", "b.example"]), 1).await;
    mount_response(&server, "gone.example", ResponseTemplate::new(410), 1).await;

    let config = create_test_config(&server.uri(), dir.path(), "a.example");
    run_crawl(&config, "test-hash", StopHandle::new())
        .await
        .unwrap();

    let store = FsNodeStore::open(&config.output.cache_dir()).unwrap();
    let graph = PeerGraph::from_store(&store).unwrap();

    assert_eq!(graph.labels(), ["a.example", "b.example"]);
    assert_eq!(graph.edges(), [(0, 1), (1, 0)]);
}

// ===== Peer source classification =====

fn create_test_source(server_uri: &str) -> HttpPeerSource {
    let http = HttpConfig {
        peers_url: format!("{}/{{domain}}/api/v1/instance/peers", server_uri),
        ..HttpConfig::default()
    };
    HttpPeerSource::new(&http).unwrap()
}

fn failure_kind(result: &FetchResult) -> Option<FailureKind> {
    match result {
        FetchResult::Failure { kind, .. } => Some(*kind),
        FetchResult::Peers { .. } => None,
    }
}

#[tokio::test]
async fn test_source_returns_peers_with_nulls() {
    let server = MockServer::start().await;
    mount_peers(&server, "a.example", json!(["b.example", null, ""]), 1).await;

    let result = create_test_source(&server.uri())
        .get_peers("a.example", Duration::from_secs(5))
        .await;

    match result {
        FetchResult::Peers { peers, .. } => assert_eq!(
            peers,
            vec![Some("b.example".to_string()), None, Some(String::new())]
        ),
        other => panic!("expected peers, got {:?}", other),
    }
}

#[tokio::test]
async fn test_source_classifies_status() {
    let server = MockServer::start().await;
    mount_response(&server, "x.example", ResponseTemplate::new(503), 1).await;

    let result = create_test_source(&server.uri())
        .get_peers("x.example", Duration::from_secs(5))
        .await;

    assert_eq!(
        result,
        FetchResult::Failure {
            kind: FailureKind::HttpStatus,
            message: "HTTP 503".to_string(),
        }
    );
}

#[tokio::test]
async fn test_source_classifies_decode_errors() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        "html.example",
        ResponseTemplate::new(200).set_body_string("<html>nope</html>"),
        1,
    )
    .await;
    mount_peers(&server, "object.example", json!({"peers": ["b.example"]}), 1).await;
    mount_peers(&server, "numbers.example", json!([1, 2, 3]), 1).await;

    let source = create_test_source(&server.uri());
    for domain in ["html.example", "object.example", "numbers.example"] {
        let result = source.get_peers(domain, Duration::from_secs(5)).await;
        assert_eq!(failure_kind(&result), Some(FailureKind::Decode), "{}", domain);
    }
}

#[tokio::test]
async fn test_source_classifies_timeout() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        "slow.example",
        ResponseTemplate::new(200)
            .set_body_json(json!([]))
            .set_delay(Duration::from_secs(2)),
        1,
    )
    .await;

    let result = create_test_source(&server.uri())
        .get_peers("slow.example", Duration::from_millis(200))
        .await;

    assert_eq!(failure_kind(&result), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_source_classifies_connection_failure() {
    // Nothing listens on port 1
    let result = create_test_source("http://127.0.0.1:1")
        .get_peers("down.example", Duration::from_secs(5))
        .await;

    assert_eq!(failure_kind(&result), Some(FailureKind::Connection));
}

#[tokio::test]
async fn test_source_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(peers_path("a.example")))
        .and(wiremock::matchers::header(
            "user-agent",
            format!("fedimap/{}", env!("CARGO_PKG_VERSION")).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = create_test_source(&server.uri())
        .get_peers("a.example", Duration::from_secs(5))
        .await;

    assert!(!result.is_failure());
}
