//! Filesystem node cache
//!
//! Each domain owns two possible files inside the cache directory:
//! `<domain>.peers.json.gz` holding the gzip-compressed [`CacheEntry`], and
//! `<domain>.error` whose presence marks a permanent failure. Every write goes
//! to a temporary file in the same directory and is renamed into place.

use crate::crawler::FailureKind;
use crate::storage::traits::{NodeStore, StorageError, StorageResult};
use crate::storage::{CacheEntry, ErrorMarker};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const PEERS_SUFFIX: &str = ".peers.json.gz";
const ERROR_SUFFIX: &str = ".error";

/// Node cache stored as one file per domain
#[derive(Debug, Clone)]
pub struct FsNodeStore {
    dir: PathBuf,
}

impl FsNodeStore {
    /// Opens (creating if needed) a cache directory
    ///
    /// # Returns
    ///
    /// * `Ok(FsNodeStore)` - The directory exists and is usable
    /// * `Err(StorageError)` - The directory could not be created
    pub fn open(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache entry for a domain
    pub fn peers_path(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{}{}", file_stem(domain), PEERS_SUFFIX))
    }

    /// Path of the error marker for a domain
    pub fn error_path(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{}{}", file_stem(domain), ERROR_SUFFIX))
    }

    /// Writes bytes to `path` through a temporary file and an atomic rename
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn read_entry(path: &Path) -> Result<CacheEntry, String> {
        let file = File::open(path).map_err(|e| e.to_string())?;
        let decoder = GzDecoder::new(BufReader::new(file));
        serde_json::from_reader(decoder).map_err(|e| e.to_string())
    }
}

/// File name stem for a domain; path separators are replaced with `_`
fn file_stem(domain: &str) -> String {
    domain.replace(|c: char| c == '/' || c == '\\', "_")
}

impl NodeStore for FsNodeStore {
    fn load(&self, domain: &str) -> Option<CacheEntry> {
        let path = self.peers_path(domain);
        if !path.exists() {
            return None;
        }

        match Self::read_entry(&path) {
            Ok(entry) if entry.domain == domain => Some(entry),
            Ok(entry) => {
                tracing::warn!(
                    "Cache entry {} belongs to {}, ignoring it",
                    path.display(),
                    entry.domain
                );
                None
            }
            Err(e) => {
                tracing::warn!("Unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn store(&self, entry: &CacheEntry) -> StorageResult<()> {
        let json = serde_json::to_vec(entry)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        self.write_atomic(&self.peers_path(&entry.domain), &compressed)
    }

    fn entries(&self) -> StorageResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        for dir_entry in std::fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let is_entry = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(PEERS_SUFFIX))
                .unwrap_or(false);
            if !is_entry {
                continue;
            }

            match Self::read_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping cache entry {}: {}", path.display(), e),
            }
        }

        entries.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(entries)
    }

    fn has_error_marker(&self, domain: &str) -> bool {
        self.error_path(domain).exists()
    }

    fn error_marker(&self, domain: &str) -> Option<ErrorMarker> {
        match std::fs::read_to_string(self.error_path(domain)) {
            Ok(content) => Some(ErrorMarker::from_content(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                // The file exists but can't be read; presence is what counts
                tracing::warn!("Unreadable error marker for {}: {}", domain, e);
                Some(ErrorMarker {
                    kind: FailureKind::Unexpected,
                    detail: e.to_string(),
                })
            }
        }
    }

    fn record_error_marker(
        &self,
        domain: &str,
        kind: FailureKind,
        detail: &str,
    ) -> StorageResult<()> {
        let marker = ErrorMarker {
            kind,
            detail: detail.to_string(),
        };
        self.write_atomic(&self.error_path(domain), marker.to_content().as_bytes())
    }
}
