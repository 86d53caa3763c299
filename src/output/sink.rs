//! Append-only crawl log streams
//!
//! Each stream is owned by one writer task fed through a bounded channel, so
//! lines from concurrent producers never interleave.

use crate::crawler::FailureKind;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const VISITS_FILE: &str = "crawl.visits";
pub const SKIPS_FILE: &str = "crawl.skips";
pub const ERRORS_FILE: &str = "crawl.errors";
pub const TIMES_FILE: &str = "crawl.times";

const CHANNEL_CAPACITY: usize = 1024;

/// One log file and the task writing it
struct StreamWriter {
    name: &'static str,
    tx: mpsc::Sender<String>,
    handle: JoinHandle<io::Result<()>>,
}

impl StreamWriter {
    async fn open(dir: &Path, name: &'static str) -> io::Result<Self> {
        let file = File::create(dir.join(name)).await?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(write_lines(file, rx));
        Ok(Self { name, tx, handle })
    }

    async fn send(&self, line: String) {
        // A closed channel means the writer hit an I/O error, reported by close()
        if self.tx.send(line).await.is_err() {
            tracing::debug!("Writer for {} is gone, dropping line", self.name);
        }
    }

    async fn close(self) -> io::Result<()> {
        drop(self.tx);
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

async fn write_lines(file: File, mut rx: mpsc::Receiver<String>) -> io::Result<()> {
    let mut writer = BufWriter::new(file);

    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.flush().await?;
    writer.get_ref().sync_all().await?;
    Ok(())
}

/// The four crawl log streams: visits, skips, errors and fetch timings
pub struct OutputSink {
    dir: PathBuf,
    visits: StreamWriter,
    skips: StreamWriter,
    errors: StreamWriter,
    times: StreamWriter,
}

impl OutputSink {
    /// Creates (truncating) the four stream files in `dir`
    ///
    /// Must be called from within a tokio runtime.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        Ok(Self {
            dir: dir.to_path_buf(),
            visits: StreamWriter::open(dir, VISITS_FILE).await?,
            skips: StreamWriter::open(dir, SKIPS_FILE).await?,
            errors: StreamWriter::open(dir, ERRORS_FILE).await?,
            times: StreamWriter::open(dir, TIMES_FILE).await?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn visit(&self, domain: &str) {
        self.visits.send(domain.to_string()).await;
    }

    pub async fn skip(&self, domain: &str) {
        self.skips.send(domain.to_string()).await;
    }

    /// Records `<domain> <kind> <detail>`, with the detail kept on one line
    pub async fn error(&self, domain: &str, kind: FailureKind, detail: &str) {
        let detail = detail.replace(['\n', '\r'], " ");
        self.errors
            .send(format!("{} {} {}", domain, kind, detail.trim()))
            .await;
    }

    /// Records `<milliseconds> <domain>`
    pub async fn timing(&self, domain: &str, elapsed: Duration) {
        self.times
            .send(format!("{} {}", elapsed.as_millis(), domain))
            .await;
    }

    /// Flushes and syncs every stream
    ///
    /// All four writers are closed even if one fails; the first error wins.
    pub async fn close(self) -> io::Result<()> {
        let results = [
            self.visits.close().await,
            self.skips.close().await,
            self.errors.close().await,
            self.times.close().await,
        ];

        results.into_iter().collect()
    }
}
