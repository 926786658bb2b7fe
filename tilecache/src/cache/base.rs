//! Byte-budgeted LRU cache.

use super::entry::CacheEntry;
use crate::core::types::CacheCounters;
use crate::core::{CacheKey, CacheReport, LruContainer};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::Path;
use tracing::{debug, warn};

/// Read access to a cached entry.
///
/// Holds the cache's read lock, so the entry cannot be evicted or unmapped
/// while the guard is alive. Drop it before adding to the same cache.
pub type EntryGuard<'a, E> = MappedRwLockReadGuard<'a, E>;

/// Result of inserting into a [`CacheState`]
pub(crate) struct Insertion<E> {
    /// Previous entry stored under the same key
    pub replaced: Option<E>,
    /// Least recently used entry pushed out to make room
    pub evicted: Option<(CacheKey, E)>,
}

/// Unlocked byte-budget authority over one LRU container.
///
/// `current_size` is maintained incrementally and always equals the sum of
/// `size()` over the contained entries.
pub(crate) struct CacheState<E> {
    container: LruContainer<CacheKey, E>,
    current_size: u64,
    /// 0 = unbounded
    max_size: u64,
    pub counters: CacheCounters,
}

impl<E: CacheEntry> CacheState<E> {
    pub fn new(max_size: u64) -> Self {
        Self {
            container: LruContainer::new(),
            current_size: 0,
            max_size,
            counters: CacheCounters::default(),
        }
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.container.contains(&key)
    }

    /// Byte-budget check done before each insertion
    fn must_evict(&self) -> bool {
        self.max_size != 0 && self.current_size >= self.max_size
    }

    /// Insert `entry`, evicting at most one LRU entry when the cache was
    /// already at or over budget before the insertion.
    ///
    /// The budget can be exceeded by up to one entry until the next insert.
    pub fn insert(&mut self, key: CacheKey, entry: E) -> Insertion<E> {
        let replaced = self.remove(key);
        let must_evict = self.must_evict();

        self.current_size += entry.size();
        let evicted = self.container.insert(key, entry, must_evict);
        if let Some((evicted_key, evicted_entry)) = &evicted {
            self.current_size -= evicted_entry.size();
            self.counters.evictions += 1;
            debug!(key = evicted_key, size = evicted_entry.size(), "Evicted LRU entry");
        }
        self.counters.inserts += 1;

        Insertion { replaced, evicted }
    }

    /// Look up an entry, promoting it to most recently used
    pub fn lookup(&mut self, key: CacheKey) -> Option<&mut E> {
        match self.container.lookup(&key) {
            Some(entry) => {
                self.counters.hits += 1;
                Some(entry)
            }
            None => {
                self.counters.misses += 1;
                None
            }
        }
    }

    pub fn peek(&self, key: CacheKey) -> Option<&E> {
        self.container.peek(&key)
    }

    pub fn peek_mut(&mut self, key: CacheKey) -> Option<&mut E> {
        self.container.peek_mut(&key)
    }

    pub fn remove(&mut self, key: CacheKey) -> Option<E> {
        let entry = self.container.remove(&key)?;
        self.current_size -= entry.size();
        Some(entry)
    }

    /// Evict LRU entries until `current_size <= target`
    fn shrink_to(&mut self, target: u64) -> Vec<(CacheKey, E)> {
        let mut evicted = Vec::new();
        while self.current_size > target {
            let Some((key, entry)) = self.container.pop_lru() else {
                break;
            };
            self.current_size -= entry.size();
            self.counters.evictions += 1;
            evicted.push((key, entry));
        }
        evicted
    }

    /// Change the budget; shrinking evicts until the cache fits
    pub fn set_max_size(&mut self, max_size: u64) -> Vec<(CacheKey, E)> {
        self.max_size = max_size;
        if max_size == 0 {
            return Vec::new();
        }
        self.shrink_to(max_size)
    }

    /// Evict until `n_bytes` are free under the budget. No-op when unbounded.
    pub fn evict_bytes(&mut self, n_bytes: u64) -> Vec<(CacheKey, E)> {
        if self.max_size == 0 {
            return Vec::new();
        }
        self.shrink_to(self.max_size.saturating_sub(n_bytes))
    }

    /// Remove every entry, least recently used first
    pub fn drain(&mut self) -> Vec<(CacheKey, E)> {
        self.current_size = 0;
        self.container.drain()
    }

    /// Entries from least to most recently used
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &E)> {
        self.container.iter()
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            entries: self.container.len(),
            current_size_bytes: self.current_size,
            max_size_bytes: self.max_size,
            ..Default::default()
        }
        .with_counters(&self.counters)
    }

    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.container.iter().map(|(_, entry)| entry.size()).sum();
        sum == self.current_size && self.container.is_consistent()
    }
}

/// Destroy an entry the cache no longer holds.
///
/// When the entry shares its backing file with `keep_path` (a replacement
/// stored at the same location) only the storage is released.
pub(crate) fn dispose<E: CacheEntry>(key: CacheKey, mut entry: E, keep_path: Option<&Path>) {
    if keep_path.is_some() && entry.storage_path() == keep_path {
        entry.deallocate();
        return;
    }
    if let Err(e) = entry.discard() {
        warn!(key, error = %e, "Failed to clean up cache entry");
    }
}

/// Byte-budgeted LRU cache with a single reader/writer lock.
///
/// The entry type is fixed per cache, so a [`MemoryCache`](super::MemoryCache)
/// only ever holds heap entries.
pub struct Cache<E> {
    state: RwLock<CacheState<E>>,
}

impl<E: CacheEntry> Cache<E> {
    /// Create a cache holding at most `max_size_bytes` (0 = unbounded)
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            state: RwLock::new(CacheState::new(max_size_bytes)),
        }
    }

    /// Look up `key`, promoting it to most recently used.
    ///
    /// The promotion happens under the write lock, which is then downgraded
    /// so the returned guard only blocks writers.
    pub fn is_cached(&self, key: CacheKey) -> Option<EntryGuard<'_, E>> {
        let mut state = self.state.write();
        if state.lookup(key).is_none() {
            debug!(key, "Cache MISS");
            return None;
        }
        debug!(key, "Cache HIT");

        let state = RwLockWriteGuard::downgrade(state);
        RwLockReadGuard::try_map(state, |state| state.peek(key)).ok()
    }

    /// Whether `key` is present, without touching recency
    pub fn contains(&self, key: CacheKey) -> bool {
        self.state.read().contains(key)
    }

    /// Insert an entry. Returns whether an older entry was evicted.
    ///
    /// Displaced entries are destroyed under the write lock, so storage
    /// shared by key is never released after a re-insert of that key.
    pub fn add(&self, key: CacheKey, entry: E) -> bool {
        let size = entry.size();
        let kind = entry.kind();

        let mut state = self.state.write();
        let Insertion { replaced, evicted } = state.insert(key, entry);
        debug!(key, size, ?kind, "Cache ADD");

        if let Some(old) = replaced {
            let keep_path = state
                .peek(key)
                .and_then(|entry| entry.storage_path())
                .map(Path::to_path_buf);
            dispose(key, old, keep_path.as_deref());
        }
        match evicted {
            Some((evicted_key, entry)) => {
                dispose(evicted_key, entry, None);
                true
            }
            None => false,
        }
    }

    /// Remove and destroy an entry. Returns whether it was present.
    pub fn remove(&self, key: CacheKey) -> bool {
        let mut state = self.state.write();
        match state.remove(key) {
            Some(entry) => {
                dispose(key, entry, None);
                true
            }
            None => false,
        }
    }

    /// Destroy every entry
    pub fn clear(&self) {
        let mut state = self.state.write();
        let drained = state.drain();
        debug!(entries = drained.len(), "Cache CLEAR");
        for (key, entry) in drained {
            dispose(key, entry, None);
        }
    }

    /// Change the byte budget, evicting LRU entries when shrinking
    pub fn set_max_size(&self, max_size_bytes: u64) {
        let mut state = self.state.write();
        let evicted = state.set_max_size(max_size_bytes);
        for (key, entry) in evicted {
            dispose(key, entry, None);
        }
    }

    /// Evict LRU entries until `n_bytes` are free under the budget.
    /// Returns the number of entries evicted.
    pub fn evict_bytes(&self, n_bytes: u64) -> usize {
        let mut state = self.state.write();
        let evicted = state.evict_bytes(n_bytes);
        let count = evicted.len();
        for (key, entry) in evicted {
            dispose(key, entry, None);
        }
        count
    }

    pub fn get_current_size(&self) -> u64 {
        self.state.read().current_size()
    }

    pub fn get_max_size(&self) -> u64 {
        self.state.read().max_size()
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn report(&self) -> CacheReport {
        self.state.read().report()
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.state.read().is_consistent()
    }
}

impl<E: CacheEntry> Default for Cache<E> {
    fn default() -> Self {
        Self::new(0)
    }
}
