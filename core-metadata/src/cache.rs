//! Time and size bounded memoization of extraction outcomes.
//!
//! Entries expire `ttl` after insertion. When the cache is full the entry
//! inserted longest ago is evicted, whatever its remaining lifetime. Reads use
//! [`LruCache::peek`] so lookups never reorder entries; the LRU list therefore
//! tracks insertion order only.
//!
//! The cache itself is not synchronized. The coordinator wraps it, together
//! with its in-flight table, in a single mutex.

use core_runtime::time::Clock;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::value::ExtractionOutcome;

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: ExtractionOutcome,
    /// `None` when `now + ttl` is past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct ExtractionCache {
    entries: LruCache<PathBuf, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ExtractionCache {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            clock,
        }
    }

    /// Returns the cached outcome for `path` if it has not expired.
    /// An expired entry is dropped on the way out.
    pub fn get(&mut self, path: &Path) -> Option<ExtractionOutcome> {
        let now = self.clock.now();
        match self.entries.peek(path) {
            Some(entry) if entry.is_live(now) => Some(entry.outcome.clone()),
            Some(_) => {
                self.entries.pop(path);
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites `path` with a fresh expiry. Overwriting also
    /// makes the entry the newest for eviction purposes.
    pub fn put(&mut self, path: PathBuf, outcome: ExtractionOutcome) {
        let now = self.clock.now();
        if self.entries.len() >= self.capacity() && !self.entries.contains(&path) {
            self.purge_expired_at(now);
        }
        let expires_at = now.checked_add(self.ttl);
        if let Some((evicted, _)) = self.entries.push(path.clone(), CacheEntry { outcome, expires_at }) {
            if evicted != path {
                tracing::trace!(evicted = %evicted.display(), "cache full, evicted oldest entry");
            }
        }
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        self.purge_expired_at(now)
    }

    fn purge_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &expired {
            self.entries.pop(path);
        }
        expired.len()
    }

    /// Live-entry check that does not remove anything.
    pub fn contains(&self, path: &Path) -> bool {
        let now = self.clock.now();
        self.entries
            .peek(path)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Number of stored entries, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for ExtractionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity())
            .field("ttl_secs", &self.ttl.as_secs())
            .finish()
    }
}
