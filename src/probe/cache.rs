//! Shared probe memoization.
//!
//! An interactive session and a background analysis job may probe the same
//! content concurrently; the cache makes the second arrival free and keeps
//! both looking at identical metadata.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::Result;
use crate::probe::scanner;
use crate::types::MediaProbe;

static CACHE: OnceLock<ProbeCache> = OnceLock::new();

/// Access the process-wide probe cache.
pub fn probe_cache() -> &'static ProbeCache {
    CACHE.get_or_init(ProbeCache::new)
}

/// Concurrent per-path memoization of probe results.
pub struct ProbeCache {
    entries: DashMap<PathBuf, Arc<MediaProbe>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProbeCache {
    pub fn new() -> Self {
        ProbeCache {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached probe for `path`, scanning the file on first use.
    pub fn get_or_scan(&self, path: &Path) -> Result<Arc<MediaProbe>> {
        let key = canonical_key(path);

        if let Some(entry) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let probe = Arc::new(scanner::scan(path)?);
        self.entries.insert(key, probe.clone());
        Ok(probe)
    }

    /// Drop the cached probe for `path`, forcing the next access to rescan.
    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(&canonical_key(path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> ProbeCacheStats {
        ProbeCacheStats {
            entry_count: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct ProbeCacheStats {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Resolve symlinks so two spellings of the same file share one entry.
fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
