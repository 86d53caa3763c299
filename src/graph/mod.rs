//! Peer graph materialization
//!
//! Builds a directed graph from the node cache: one node per cached domain,
//! one edge per peer reference that is itself a cached domain.

use crate::domain::normalize_domain;
use crate::storage::{CacheEntry, NodeStore, StorageResult};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const LABELS_FILE: &str = "peers.labels";
pub const EDGES_FILE: &str = "peers.edges";

/// Directed peer graph with dense node ids
///
/// Ids follow sorted domain order, so the same cache always yields the
/// same graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerGraph {
    labels: Vec<String>,
    edges: Vec<(usize, usize)>,
}

impl PeerGraph {
    /// Builds the graph from every valid entry of a node cache
    pub fn from_store(store: &dyn NodeStore) -> StorageResult<Self> {
        Ok(Self::from_entries(&store.entries()?))
    }

    pub fn from_entries(entries: &[CacheEntry]) -> Self {
        let mut labels: Vec<String> = entries.iter().map(|e| e.domain.clone()).collect();
        labels.sort();
        labels.dedup();

        let ids: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(id, domain)| (domain.as_str(), id))
            .collect();

        let mut edges = BTreeSet::new();
        for entry in entries {
            let Some(&src) = ids.get(entry.domain.as_str()) else {
                continue;
            };

            for peer in entry.peers.iter().flatten() {
                let Some(peer) = normalize_domain(peer) else {
                    continue;
                };
                if let Some(&dst) = ids.get(peer.as_str()) {
                    if dst != src {
                        edges.insert((src, dst));
                    }
                }
            }
        }

        Self {
            labels,
            edges: edges.into_iter().collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Domain names, indexed by node id
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(source, destination)` pairs, sorted
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn id_of(&self, domain: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(domain)).ok()
    }

    /// Writes one domain per line; the line number is the node id
    pub fn write_labels(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for label in &self.labels {
            writeln!(writer, "{}", label)?;
        }
        writer.flush()
    }

    /// Writes one `<source> <destination>` pair per line
    pub fn write_edges(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for (src, dst) in &self.edges {
            writeln!(writer, "{} {}", src, dst)?;
        }
        writer.flush()
    }
}
