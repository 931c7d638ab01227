//! Graph cache keyed by map fingerprint
//!
//! Building a graph is the only non-trivial setup cost of planning, so a
//! [`GraphCache`] keeps recently built graphs and hands out shared references.
//! Lookups take a read lock; builds are serialized through a single writer so
//! two threads never build the same map at once.

use crate::graph::OperationGraph;
use deltaplan_config::{MapFingerprint, OperationMap};
use deltaplan_core::{constants::DEFAULT_GRAPH_CACHE_ENTRIES, Result};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Graph cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCacheConfig {
    /// Maximum number of graphs kept; zero disables caching
    pub max_entries: usize,
}

impl Default for GraphCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_GRAPH_CACHE_ENTRIES,
        }
    }
}

/// Cache of built graphs, safe to share between threads
#[derive(Debug)]
pub struct GraphCache {
    // Insertion order doubles as eviction order.
    entries: RwLock<IndexMap<MapFingerprint, Arc<OperationGraph>>>,
    reload: Mutex<()>,
    config: GraphCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GraphCache {
    /// Create a cache with default configuration
    pub fn new() -> Self {
        Self::with_config(GraphCacheConfig::default())
    }

    pub fn with_config(config: GraphCacheConfig) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            reload: Mutex::new(()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The graph for `map`, built on first use.
    ///
    /// Build failures are returned and never cached.
    pub fn get_or_build(&self, map: &OperationMap) -> Result<Arc<OperationGraph>> {
        let fingerprint = map.fingerprint();

        if let Some(graph) = self.lookup(fingerprint) {
            return Ok(graph);
        }

        let _writer = self.reload.lock();

        // Another thread may have finished the build while we waited.
        if let Some(graph) = self.lookup(fingerprint) {
            return Ok(graph);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        deltaplan_utils::tracing::cache_event(fingerprint.short(), false);

        let graph = Arc::new(OperationGraph::build(map)?);
        self.insert(fingerprint.clone(), Arc::clone(&graph));
        Ok(graph)
    }

    /// A cached graph, if present
    pub fn get(&self, fingerprint: &MapFingerprint) -> Option<Arc<OperationGraph>> {
        self.entries.read().get(fingerprint).cloned()
    }

    fn lookup(&self, fingerprint: &MapFingerprint) -> Option<Arc<OperationGraph>> {
        let graph = self.get(fingerprint)?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        deltaplan_utils::tracing::cache_event(fingerprint.short(), true);
        Some(graph)
    }

    fn insert(&self, fingerprint: MapFingerprint, graph: Arc<OperationGraph>) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.write();
        while entries.len() >= self.config.max_entries {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                tracing::debug!(fingerprint = %evicted.short(), "evicted cached graph");
            }
        }
        entries.insert(fingerprint, graph);
    }

    /// Drop every cached graph; counters are kept
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> GraphCacheStats {
        GraphCacheStats {
            entries: self.entries.read().len(),
            max_entries: self.config.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the graph cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphCacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}
