//! Query result cache
//!
//! LRU keyed by the canonical query signature. Only results produced under
//! the fast-path threshold are stored; any write that can change a result
//! clears the whole cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::query::ScoredNode;
use crate::error::{GraphError, Result};

/// Default number of cached queries
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Hit/miss counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct QueryCache {
    entries: Mutex<LruCache<String, Vec<ScoredNode>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Vec<ScoredNode>>>> {
        self.entries
            .lock()
            .map_err(|_| GraphError::Init("Query cache lock poisoned".into()))
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<ScoredNode>>> {
        let hit = self.lock()?.get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hit)
    }

    pub fn put(&self, key: String, results: Vec<ScoredNode>) -> Result<()> {
        self.lock()?.put(key, results);
        Ok(())
    }

    /// Drop every cached result
    pub fn invalidate(&self) -> Result<()> {
        let mut entries = self.lock()?;
        if !entries.is_empty() {
            entries.clear();
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            entries: self.lock()?.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        })
    }
}
