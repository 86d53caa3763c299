//! Crawl coordinator - the main crawl loop
//!
//! The coordinator is the only owner of the [`Scheduler`]. Workers never touch
//! crawl state; each one resolves a single domain and hands the result back
//! through the `JoinSet`.

use crate::config::CrawlerConfig;
use crate::crawler::scheduler::{Applied, ScheduledFetch, Scheduler, Visit};
use crate::crawler::{FailureKind, FetchOrigin, FetchOutcome, FetchResult, Fetcher};
use crate::output::{OutputSink, StatusLine};
use crate::state::Counters;
use crate::FedimapError;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Why the crawl loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Frontier and in-flight set stayed empty for the whole debounce window
    Finished,

    /// The stop handle was triggered
    Interrupted,

    /// The configured wall-clock deadline passed
    DeadlineReached,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Finished => "finished",
            Self::Interrupted => "interrupted",
            Self::DeadlineReached => "deadline reached",
        })
    }
}

/// Final account of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub completion: Completion,
    pub counters: Counters,

    /// Domains still in the frontier when the loop ended, sorted
    pub frontier_remaining: Vec<String>,

    /// Domains whose fetch was cancelled after the grace period, sorted
    pub in_flight_abandoned: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlReport {
    /// True if every reachable domain was visited
    ///
    /// A stop or deadline that happened to leave nothing pending still counts
    /// as complete.
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Finished
            || (self.frontier_remaining.is_empty() && self.in_flight_abandoned.is_empty())
    }
}

/// Run-wide stop flag
///
/// Cloning shares the flag. Once stopped, it stays stopped.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`StopHandle::stop`] has been called
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing knobs of the crawl loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub debounce: Duration,
    pub status_interval: Duration,
    pub grace_period: Duration,
    pub deadline: Option<Duration>,
}

impl CoordinatorSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            debounce: config.debounce(),
            status_interval: config.status_interval(),
            grace_period: config.grace_period(),
            deadline: config.deadline(),
        }
    }
}

/// A finished worker: the domain, its outcome, and the slot it occupied
struct WorkerDone {
    domain: String,
    outcome: FetchOutcome,
    permit: OwnedSemaphorePermit,
}

/// Drives a crawl from a seeded scheduler to completion
pub struct Coordinator {
    scheduler: Scheduler,
    fetcher: Fetcher,
    sink: OutputSink,
    settings: CoordinatorSettings,
    stop: StopHandle,
    workers: JoinSet<WorkerDone>,
}

impl Coordinator {
    /// Creates a coordinator
    ///
    /// The scheduler should already be seeded; an empty one finishes after
    /// one debounce window.
    pub fn new(
        scheduler: Scheduler,
        fetcher: Fetcher,
        sink: OutputSink,
        settings: CoordinatorSettings,
        stop: StopHandle,
    ) -> Self {
        Self {
            scheduler,
            fetcher,
            sink,
            settings,
            stop,
            workers: JoinSet::new(),
        }
    }

    /// Runs the crawl loop until it finishes, is stopped, or hits the deadline
    ///
    /// # Loop
    ///
    /// 1. Dispatch frontier domains while worker slots are free
    /// 2. Wait for a worker result, a status tick, the stop signal, the
    ///    deadline, or the end of the idle debounce window
    /// 3. Apply results and record them in the output streams
    ///
    /// After a stop or deadline, in-flight fetches get the grace period to
    /// finish; their results are applied but nothing new is dispatched.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The loop ended and the output streams are closed
    /// * `Err(FedimapError)` - Crawl state was violated or output could not be written
    pub async fn run(mut self) -> Result<CrawlReport, FedimapError> {
        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(
            "Crawling with {} workers, {} domains queued",
            self.scheduler.concurrency(),
            self.scheduler.state().frontier_len()
        );

        let completion = match self.crawl(started).await {
            Ok(completion) => completion,
            Err(e) => {
                if let Err(close_err) = self.sink.close().await {
                    tracing::warn!("Failed to flush output streams: {}", close_err);
                }
                return Err(e);
            }
        };

        self.report_status(started.elapsed());

        let state = self.scheduler.state();
        let report = CrawlReport {
            completion,
            counters: self.scheduler.counters().clone(),
            frontier_remaining: state.frontier_snapshot(),
            in_flight_abandoned: state.in_flight_snapshot(),
            started_at,
            finished_at: Utc::now(),
        };

        self.sink.close().await?;

        tracing::info!(
            "Crawl {}: {} nodes, {} errors, {} skips",
            report.completion,
            report.counters.nodes,
            report.counters.errors,
            report.counters.skips
        );

        Ok(report)
    }

    /// The select loop, followed by the grace-period drain when cut short
    async fn crawl(&mut self, started: Instant) -> Result<Completion, FedimapError> {
        let deadline = self.settings.deadline.map(|limit| started + limit);

        let mut status = tokio::time::interval_at(
            started + self.settings.status_interval,
            self.settings.status_interval,
        );
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut idle_since: Option<Instant> = None;

        let completion = loop {
            self.dispatch_ready();

            if self.scheduler.is_idle() {
                idle_since.get_or_insert_with(Instant::now);
            } else {
                idle_since = None;
            }
            let settle_at = idle_since.map(|since| since + self.settings.debounce);

            tokio::select! {
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    self.finish(joined).await?;
                }
                _ = status.tick() => {
                    self.report_status(started.elapsed());
                }
                _ = self.stop.stopped() => {
                    break Completion::Interrupted;
                }
                _ = sleep_until_opt(deadline) => {
                    break Completion::DeadlineReached;
                }
                _ = sleep_until_opt(settle_at) => {
                    break Completion::Finished;
                }
            }
        };

        if completion != Completion::Finished {
            tracing::info!("Stopping crawl: {}", completion);
            self.drain().await?;
        }

        Ok(completion)
    }

    /// Spawns a worker for every domain that can be dispatched right now
    fn dispatch_ready(&mut self) {
        while let Some(ScheduledFetch { domain, permit }) = self.scheduler.next_dispatch() {
            let fetcher = self.fetcher.clone();

            self.workers.spawn(async move {
                let outcome = match AssertUnwindSafe(fetcher.fetch(&domain))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(payload) => FetchOutcome {
                        result: FetchResult::failure(
                            FailureKind::Unexpected,
                            format!("worker panicked: {}", panic_message(&*payload)),
                        ),
                        origin: FetchOrigin::Network,
                    },
                };

                WorkerDone {
                    domain,
                    outcome,
                    permit,
                }
            });
        }
    }

    /// Applies one worker result, then releases its slot
    async fn finish(&mut self, joined: Result<WorkerDone, JoinError>) -> Result<(), FedimapError> {
        let WorkerDone {
            domain,
            outcome,
            permit,
        } = joined?;

        let applied = self.scheduler.apply(&domain, outcome)?;
        drop(permit);

        self.record(applied).await;
        Ok(())
    }

    /// Writes the log lines and error marker for an applied result
    async fn record(&self, applied: Applied) {
        let Applied {
            domain,
            visit,
            discovered,
            skipped,
        } = applied;

        match visit {
            Visit::Fetched { elapsed, origin } => {
                tracing::debug!(
                    "Visited {} via {:?} in {}ms, {} new peers",
                    domain,
                    origin,
                    elapsed.as_millis(),
                    discovered.len()
                );
                self.sink.visit(&domain).await;
                if origin == FetchOrigin::Network {
                    self.sink.timing(&domain, elapsed).await;
                }
            }
            Visit::Failed {
                kind,
                message,
                persist_marker,
            } => {
                if persist_marker {
                    tracing::warn!("Failed to fetch {}: {} {}", domain, kind, message);
                    self.persist_marker(&domain, kind, &message).await;
                } else {
                    tracing::debug!("{}: {}", domain, message);
                }
                self.sink.error(&domain, kind, &message).await;
            }
        }

        for peer in &skipped {
            self.sink.skip(peer).await;
        }
    }

    async fn persist_marker(&self, domain: &str, kind: FailureKind, message: &str) {
        let store = Arc::clone(self.fetcher.store());
        let owned_domain = domain.to_string();
        let owned_message = message.to_string();

        let result = tokio::task::spawn_blocking(move || {
            store.record_error_marker(&owned_domain, kind, &owned_message)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to persist error marker for {}: {}", domain, e),
            Err(e) => tracing::warn!("Error marker task for {} failed: {}", domain, e),
        }
    }

    /// Lets in-flight fetches finish within the grace period, then cancels the rest
    async fn drain(&mut self) -> Result<(), FedimapError> {
        if self.workers.is_empty() {
            return Ok(());
        }

        tracing::info!(
            "Waiting up to {:?} for {} in-flight fetches",
            self.settings.grace_period,
            self.workers.len()
        );

        let grace = tokio::time::sleep(self.settings.grace_period);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                joined = self.workers.join_next() => match joined {
                    Some(joined) => self.finish(joined).await?,
                    None => break,
                },
                _ = &mut grace => {
                    tracing::warn!(
                        "Grace period over, cancelling {} fetches",
                        self.workers.len()
                    );
                    break;
                }
            }
        }

        self.workers.shutdown().await;
        Ok(())
    }

    fn report_status(&self, elapsed: Duration) {
        let line = StatusLine::capture(self.scheduler.counters(), self.scheduler.state(), elapsed);
        tracing::info!("{}", line);
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::mock::MockSource;
    use crate::domain::ExclusionFilter;
    use crate::output::{ERRORS_FILE, SKIPS_FILE, TIMES_FILE, VISITS_FILE};
    use crate::state::{DomainPhase, VisitOutcome};
    use crate::storage::{CacheEntry, FsNodeStore, NodeStore};
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn fast_settings() -> CoordinatorSettings {
        CoordinatorSettings {
            debounce: Duration::from_millis(50),
            status_interval: Duration::from_millis(100),
            grace_period: Duration::from_millis(100),
            deadline: None,
        }
    }

    struct Harness {
        dir: TempDir,
        store: Arc<FsNodeStore>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(FsNodeStore::open(&dir.path().join("peers")).unwrap());
            Self { dir, store }
        }

        async fn coordinator(
            &self,
            source: Arc<MockSource>,
            seeds: &[&str],
            concurrency: usize,
            settings: CoordinatorSettings,
            stop: StopHandle,
        ) -> Coordinator {
            let filter = ExclusionFilter::from_patterns("suffix:.blocked.cf").unwrap();
            let mut scheduler = Scheduler::new(filter, concurrency);
            for seed in seeds {
                scheduler.seed(seed);
            }
            let fetcher = Fetcher::new(source, self.store.clone(), Duration::from_secs(5), false);
            let sink = OutputSink::create(self.dir.path()).await.unwrap();
            Coordinator::new(scheduler, fetcher, sink, settings, stop)
        }

        fn lines(&self, name: &str) -> Vec<String> {
            read_lines(&self.dir.path().join(name))
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        let mut lines: Vec<String> = std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn test_peers_are_filtered_and_followed() {
        let harness = Harness::new();
        let source = Arc::new(
            MockSource::new()
                .with_raw_peers(
                    "a.example",
                    vec![
                        Some("b.example".to_string()),
                        Some("c.blocked.cf".to_string()),
                        Some(String::new()),
                        None,
                    ],
                )
                .with_peers("b.example", &["a.example"]),
        );
        let coordinator = harness
            .coordinator(source.clone(), &["a.example"], 4, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::Finished);
        assert!(report.is_complete());
        assert_eq!(report.counters.nodes, 2);
        assert_eq!(report.counters.links, 1);
        assert_eq!(report.counters.skips, 1);
        assert_eq!(source.calls(), vec!["a.example", "b.example"]);

        assert_eq!(harness.lines(VISITS_FILE), vec!["a.example", "b.example"]);
        assert_eq!(harness.lines(SKIPS_FILE), vec!["c.blocked.cf"]);
        assert!(harness.lines(ERRORS_FILE).is_empty());
        assert_eq!(harness.lines(TIMES_FILE).len(), 2);
    }

    #[tokio::test]
    async fn test_cache_hits_are_not_timed() {
        let harness = Harness::new();
        harness
            .store
            .store(&CacheEntry::new(
                "a.example",
                vec![Some("b.example".to_string())],
                Duration::from_millis(80),
            ))
            .unwrap();
        let source = Arc::new(MockSource::new());
        let coordinator = harness
            .coordinator(source.clone(), &["a.example"], 4, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.counters.cache_hits, 1);
        assert_eq!(report.counters.downloads, 1);
        assert_eq!(source.calls(), vec!["b.example"]);
        assert_eq!(harness.lines(VISITS_FILE), vec!["a.example", "b.example"]);
        let times = harness.lines(TIMES_FILE);
        assert_eq!(times.len(), 1);
        assert!(times[0].ends_with(" b.example"));
    }

    #[tokio::test]
    async fn test_streams_are_flushed_when_crawl_fails() {
        let harness = Harness::new();
        let source = Arc::new(MockSource::new().with_peers("a.example", &[]));
        let settings = CoordinatorSettings {
            debounce: Duration::from_secs(5),
            ..fast_settings()
        };
        let mut coordinator = harness
            .coordinator(source, &["a.example"], 4, settings, StopHandle::new())
            .await;

        // A result for a domain that was never dispatched
        let permit = Arc::new(Semaphore::new(1)).try_acquire_owned().unwrap();
        coordinator.workers.spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            WorkerDone {
                domain: "ghost.example".to_string(),
                outcome: FetchOutcome {
                    result: FetchResult::Peers {
                        peers: Vec::new(),
                        elapsed: Duration::ZERO,
                    },
                    origin: FetchOrigin::Network,
                },
                permit,
            }
        });

        let err = coordinator.run().await.unwrap_err();

        assert!(matches!(err, FedimapError::InvalidTransition { .. }));
        assert_eq!(harness.lines(VISITS_FILE), vec!["a.example"]);
    }

    #[tokio::test]
    async fn test_failure_persists_marker() {
        let harness = Harness::new();
        let source = Arc::new(
            MockSource::new()
                .with_peers("a.example", &["x.example"])
                .with_failure("x.example", FailureKind::HttpStatus, "HTTP 503"),
        );
        let coordinator = harness
            .coordinator(source, &["a.example"], 4, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.counters.errors, 1);
        assert!(harness.store.has_error_marker("x.example"));
        assert!(harness.store.load("x.example").is_none());
        assert_eq!(
            harness.lines(ERRORS_FILE),
            vec!["x.example http-status HTTP 503"]
        );
    }

    #[tokio::test]
    async fn test_concurrency_budget_is_respected() {
        let harness = Harness::new();
        let source = Arc::new(MockSource::new().with_delay(Duration::from_millis(100)));
        let seeds = ["d1.example", "d2.example", "d3.example", "d4.example", "d5.example"];
        let coordinator = harness
            .coordinator(source.clone(), &seeds, 2, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::Finished);
        assert_eq!(report.counters.nodes, 5);
        assert_eq!(source.call_count(), 5);
        assert_eq!(source.peak(), 2);
    }

    #[tokio::test]
    async fn test_finish_waits_for_debounce() {
        let harness = Harness::new();
        let settings = CoordinatorSettings {
            debounce: Duration::from_millis(300),
            ..fast_settings()
        };
        let coordinator = harness
            .coordinator(Arc::new(MockSource::new()), &["a.example"], 1, settings, StopHandle::new())
            .await;

        let start = std::time::Instant::now();
        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::Finished);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_stop_interrupts_and_abandons() {
        let harness = Harness::new();
        let source = Arc::new(MockSource::new().with_delay(Duration::from_secs(30)));
        let stop = StopHandle::new();
        let coordinator = harness
            .coordinator(source, &["a.example", "b.example"], 1, fast_settings(), stop.clone())
            .await;

        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.stop();
        });
        let report = coordinator.run().await.unwrap();

        assert!(stop.is_stopped());
        assert_eq!(report.completion, Completion::Interrupted);
        assert!(!report.is_complete());
        assert_eq!(report.in_flight_abandoned, vec!["a.example"]);
        assert_eq!(report.frontier_remaining, vec!["b.example"]);
    }

    #[tokio::test]
    async fn test_deadline_reached() {
        let harness = Harness::new();
        let source = Arc::new(MockSource::new().with_delay(Duration::from_secs(30)));
        let settings = CoordinatorSettings {
            deadline: Some(Duration::from_millis(100)),
            ..fast_settings()
        };
        let coordinator = harness
            .coordinator(source, &["a.example"], 1, settings, StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::DeadlineReached);
        assert!(!report.is_complete());
        assert_eq!(report.in_flight_abandoned, vec!["a.example"]);
    }

    #[tokio::test]
    async fn test_results_within_grace_period_are_applied() {
        let harness = Harness::new();
        let source = Arc::new(
            MockSource::new()
                .with_delay(Duration::from_millis(100))
                .with_peers("a.example", &["b.example"]),
        );
        let stop = StopHandle::new();
        let settings = CoordinatorSettings {
            grace_period: Duration::from_secs(5),
            ..fast_settings()
        };
        let coordinator = harness
            .coordinator(source.clone(), &["a.example"], 1, settings, stop.clone())
            .await;

        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.stop();
        });
        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::Interrupted);
        assert_eq!(report.counters.nodes, 1);
        assert!(report.in_flight_abandoned.is_empty());
        // Discovered during the grace period, never dispatched
        assert_eq!(report.frontier_remaining, vec!["b.example"]);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_unexpected_failure() {
        let harness = Harness::new();
        let source = Arc::new(
            MockSource::new()
                .with_peers("a.example", &["boom.example", "b.example"])
                .with_panic("boom.example"),
        );
        let coordinator = harness
            .coordinator(source, &["a.example"], 2, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completion, Completion::Finished);
        assert_eq!(report.counters.nodes, 2);
        assert_eq!(report.counters.errors, 1);
        let errors = harness.lines(ERRORS_FILE);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("boom.example unexpected worker panicked"));
    }

    #[tokio::test]
    async fn test_error_marker_short_circuits_next_run() {
        let harness = Harness::new();
        harness
            .store
            .record_error_marker("x.example", FailureKind::Timeout, "timed out")
            .unwrap();
        let source = Arc::new(MockSource::new());
        let coordinator = harness
            .coordinator(source.clone(), &["x.example"], 1, fast_settings(), StopHandle::new())
            .await;

        let report = coordinator.run().await.unwrap();

        assert_eq!(source.call_count(), 0);
        assert_eq!(report.counters.errors, 1);
        assert_eq!(report.counters.timeouts, 1);
        assert_eq!(
            harness.store.error_marker("x.example").unwrap().detail,
            "timed out"
        );
    }

    #[tokio::test]
    async fn test_stop_handle() {
        let stop = StopHandle::new();
        assert!(!stop.is_stopped());

        let waiter = stop.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });
        stop.stop();
        task.await.unwrap();

        // Already stopped resolves immediately
        stop.stopped().await;
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_completion_display() {
        assert_eq!(Completion::Finished.to_string(), "finished");
        assert_eq!(Completion::DeadlineReached.to_string(), "deadline reached");
    }

    #[test]
    fn test_phase_after_skip_is_terminal() {
        let filter = ExclusionFilter::from_patterns("suffix:.blocked.cf").unwrap();
        let mut scheduler = Scheduler::new(filter, 1);
        scheduler.seed("x.blocked.cf");
        assert_eq!(
            scheduler.state().phase("x.blocked.cf"),
            Some(DomainPhase::Visited(VisitOutcome::Skipped))
        );
    }
}
