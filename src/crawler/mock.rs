//! In-memory peer source for unit tests

use crate::crawler::{FailureKind, FetchResult, PeerSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Peers(Vec<Option<String>>),
    Failure(FailureKind, String),
    Panic,
}

/// Answers from a fixed table; unknown domains have no peers
///
/// Records every call and the highest number of calls running at once.
pub(crate) struct MockSource {
    replies: HashMap<String, Reply>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self {
            replies: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_peers(self, domain: &str, peers: &[&str]) -> Self {
        let peers = peers.iter().map(|p| Some(p.to_string())).collect();
        self.with_raw_peers(domain, peers)
    }

    pub(crate) fn with_raw_peers(mut self, domain: &str, peers: Vec<Option<String>>) -> Self {
        self.replies.insert(domain.to_string(), Reply::Peers(peers));
        self
    }

    pub(crate) fn with_failure(mut self, domain: &str, kind: FailureKind, message: &str) -> Self {
        self.replies
            .insert(domain.to_string(), Reply::Failure(kind, message.to_string()));
        self
    }

    pub(crate) fn with_panic(mut self, domain: &str) -> Self {
        self.replies.insert(domain.to_string(), Reply::Panic);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Domains requested so far, sorted
    pub(crate) fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerSource for MockSource {
    async fn get_peers(&self, domain: &str, _timeout: Duration) -> FetchResult {
        self.calls.lock().unwrap().push(domain.to_string());

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(domain) {
            Some(Reply::Peers(peers)) => FetchResult::Peers {
                peers: peers.clone(),
                elapsed: self.delay,
            },
            Some(Reply::Failure(kind, message)) => FetchResult::failure(*kind, message.clone()),
            Some(Reply::Panic) => panic!("peer source blew up on {}", domain),
            None => FetchResult::Peers {
                peers: Vec::new(),
                elapsed: self.delay,
            },
        }
    }
}
