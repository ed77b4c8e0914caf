//! Cache store.
//!
//! All state lives behind one mutex; every public operation takes the lock for
//! its full duration and never across an `.await`. Bodies leave the store as
//! [`Bytes`] clones, so no caller ever observes memory the store has released.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::{CacheEntry, CacheError, CacheKeyMode, CacheLimits, CacheStats};

/// Outcome of [`ObjectCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The body was stored at the most-recently-used position.
    Stored {
        /// An entry with the same key was replaced.
        replaced: bool,
        /// Number of least-recently-used entries evicted to restore the budget.
        evicted: usize,
    },
    /// The body exceeded the object limit and was not stored.
    Rejected { size: usize },
}

/// Thread-safe LRU object cache with a byte budget.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use cacheproxy::cache::{CacheKeyMode, CacheLimits, ObjectCache};
///
/// let cache = ObjectCache::new(CacheLimits::default(), CacheKeyMode::Path).unwrap();
/// cache.insert("/foo.html".into(), Bytes::from_static(b"hello"));
///
/// let entry = cache.lookup("/foo.html").unwrap();
/// assert_eq!(entry.size(), 5);
/// assert!(cache.touch("/foo.html"));
/// ```
#[derive(Debug)]
pub struct ObjectCache {
    inner: Mutex<CacheInner>,
    limits: CacheLimits,
    key_mode: CacheKeyMode,
}

#[derive(Debug)]
struct CacheInner {
    /// Most recently used first.
    entries: LruCache<String, CacheEntry>,
    total_size: usize,
    counters: CacheStats,
}

impl ObjectCache {
    /// Creates an empty cache.
    ///
    /// `key_mode` fixes how handlers compose keys for the lifetime of the
    /// cache: by path alone, or by `host:port` plus path.
    ///
    /// # Errors
    ///
    /// Returns an error if `limits` would allow an admissible object that can
    /// never fit the budget.
    pub fn new(limits: CacheLimits, key_mode: CacheKeyMode) -> Result<Self, CacheError> {
        limits.validate()?;
        Ok(Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_size: 0,
                counters: CacheStats::default(),
            }),
            limits,
            key_mode,
        })
    }

    /// The limits this cache enforces.
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// The key composition chosen at construction.
    pub fn key_mode(&self) -> CacheKeyMode {
        self.key_mode
    }

    /// Builds the cache key for a resolved request target.
    pub fn key_for(&self, host: &str, port: u16, path: &str) -> String {
        self.key_mode.key(host, port, path)
    }

    /// Returns `true` if a body of `size` bytes may be cached.
    pub fn admits(&self, size: usize) -> bool {
        size <= self.limits.max_object_size
    }

    /// Returns the entry stored under `key`. Recency order is not changed.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let found = inner.entries.peek(key).cloned();
        if found.is_some() {
            inner.counters.hits += 1;
        } else {
            inner.counters.misses += 1;
        }
        found
    }

    /// Moves the entry under `key` to the most-recently-used position.
    ///
    /// Returns `false` if the entry is gone, e.g. evicted after a lookup.
    pub fn touch(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.contains(key) {
            inner.entries.promote(key);
            true
        } else {
            debug!(key, "touch skipped: entry no longer cached");
            false
        }
    }

    /// Stores `body` under `key` at the most-recently-used position, then
    /// evicts least-recently-used entries until the budget holds again.
    ///
    /// An existing entry under the same key is replaced, so keys stay unique.
    pub fn insert(&self, key: String, body: Bytes) -> Insertion {
        let size = body.len();
        let mut inner = self.inner.lock();

        if size > self.limits.max_object_size {
            inner.counters.rejected += 1;
            return Insertion::Rejected { size };
        }

        let entry = CacheEntry::new(key.clone(), body);
        let replaced = inner.entries.put(key, entry);
        if let Some(old) = &replaced {
            inner.total_size -= old.size();
        }
        inner.total_size += size;
        inner.counters.insertions += 1;

        let mut evicted = 0;
        while inner.total_size > self.limits.max_cache_size {
            let Some((old_key, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_size -= old.size();
            inner.counters.evictions += 1;
            evicted += 1;
            debug!(key = %old_key, size = old.size(), "evicted");
        }
        debug_assert!(inner.total_size <= self.limits.max_cache_size);

        Insertion::Stored {
            replaced: replaced.is_some(),
            evicted,
        }
    }

    /// Returns `true` if `key` is cached. Recency order is not changed and no
    /// hit or miss is counted.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Sum of all cached body sizes.
    pub fn total_size(&self) -> usize {
        self.inner.lock().total_size
    }

    /// All entries, most recently used first.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Returns a consistent snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            total_size: inner.total_size,
            ..inner.counters.clone()
        }
    }
}
