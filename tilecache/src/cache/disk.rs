//! Two-tier disk cache.
//!
//! Every entry is backed by a file under `<root>/Cache/<cache_name>/`. A key
//! is in one of three states:
//!
//! - **Absent** - not catalogued
//! - **Cold** - catalogued, file on disk, not mapped
//! - **Hot** - catalogued and memory-mapped
//!
//! The cold tier owns the entries and enforces the disk budget; the hot tier
//! only records which keys are mapped, with its own budget expressed as a
//! fraction of the disk budget. Overflowing the hot tier demotes its least
//! recently used key to cold (the file is unmapped but kept). Overflowing the
//! cold tier destroys its least recently used entry and deletes the file.
//! Looking up a cold entry maps it again and promotes it to hot.
//!
//! Both tiers sit behind one lock so no observer ever sees a hot key that is
//! not catalogued or not mapped.

use super::base::{CacheState, EntryGuard, dispose};
use super::disk_entry::DiskEntry;
use super::layout;
use crate::config::{DiskCacheConfig, validate_in_memory_fraction};
use crate::core::{CacheError, CacheKey, CacheReport, LruContainer, Result};
use crate::persistence::catalogue;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of [`DiskCache::restore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entries put back in the cold tier
    pub restored: usize,
    /// Records dropped because their file was missing or the key was duplicated
    pub skipped: usize,
    /// The catalogue was stale and the cache directory was rebuilt
    pub rebuilt: bool,
}

struct DiskTiers<E> {
    cold: CacheState<E>,
    /// Mapped keys and their sizes
    hot: LruContainer<CacheKey, u64>,
    hot_size: u64,
    max_in_memory_fraction: f64,
}

impl<E: DiskEntry> DiskTiers<E> {
    /// 0 only when the disk budget is unbounded; otherwise at least 1 byte
    fn max_hot_size(&self) -> u64 {
        let max_size = self.cold.max_size();
        if max_size == 0 {
            return 0;
        }
        ((max_size as f64 * self.max_in_memory_fraction) as u64).max(1)
    }

    fn must_demote(&self) -> bool {
        self.cold.max_size() != 0 && self.hot_size >= self.max_hot_size()
    }

    /// Unmap a cold-tier entry. The caller has already dropped it from `hot`.
    fn unmap(&mut self, key: CacheKey) {
        if let Some(entry) = self.cold.peek_mut(key) {
            entry.deallocate();
        }
        self.cold.counters.demotions += 1;
        debug!(key, "Demoted entry to disk");
    }

    /// Record `key` as mapped, demoting the hot LRU key if the hot tier was
    /// already at its budget.
    fn mark_hot(&mut self, key: CacheKey, size: u64) {
        let must_demote = self.must_demote();
        if let Some((displaced, displaced_size)) = self.hot.insert(key, size, must_demote) {
            self.hot_size -= displaced_size;
            if displaced != key {
                self.unmap(displaced);
            }
        }
        self.hot_size += size;
    }

    fn unmark_hot(&mut self, key: CacheKey) {
        if let Some(size) = self.hot.remove(&key) {
            self.hot_size -= size;
        }
    }

    /// Demote hot keys until the hot tier fits its budget
    fn shrink_hot(&mut self) {
        if self.cold.max_size() == 0 {
            return;
        }
        let max_hot = self.max_hot_size();
        while self.hot_size > max_hot {
            let Some((key, size)) = self.hot.pop_lru() else {
                break;
            };
            self.hot_size -= size;
            self.unmap(key);
        }
    }

    /// Demote every hot key regardless of recency
    fn demote_all(&mut self) -> usize {
        let demoted = self.hot.drain();
        self.hot_size = 0;
        for (key, _) in &demoted {
            self.unmap(*key);
        }
        demoted.len()
    }

    fn drain(&mut self) -> Vec<(CacheKey, E)> {
        self.hot.clear();
        self.hot_size = 0;
        self.cold.drain()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let hot_ok = self.hot.iter().all(|(key, size)| {
            self.cold
                .peek(*key)
                .is_some_and(|entry| entry.is_mapped() && entry.size() == *size)
        });
        let mapped_ok = self
            .cold
            .iter()
            .all(|(key, entry)| entry.is_mapped() == self.hot.contains(key));
        let hot_size: u64 = self.hot.iter().map(|(_, size)| *size).sum();
        hot_ok && mapped_ok && hot_size == self.hot_size && self.cold.is_consistent()
    }
}

fn backing_file_matches<E: DiskEntry>(entry: &E) -> bool {
    let path = entry.backing().path();
    layout::file_exists(path) && fs::metadata(path).is_ok_and(|meta| meta.len() == entry.size())
}

/// Disk cache of `E` entries with a memory-mapped hot tier
pub struct DiskCache<E> {
    cache_dir: PathBuf,
    tiers: RwLock<DiskTiers<E>>,
}

impl<E: DiskEntry> DiskCache<E> {
    /// Create an empty cache and its directory skeleton, ignoring any catalogue
    pub fn new(config: &DiskCacheConfig) -> Result<Self> {
        validate_in_memory_fraction(config.max_in_memory_fraction)?;

        let cache_dir = layout::cache_directory(&config.root_path, E::cache_name());
        layout::initialize_sub_directories(&cache_dir)?;

        info!(
            "Initializing disk cache {:?} with max_size={} bytes, in_memory_fraction={}",
            cache_dir, config.max_size_bytes, config.max_in_memory_fraction
        );

        Ok(Self {
            cache_dir,
            tiers: RwLock::new(DiskTiers {
                cold: CacheState::new(config.max_size_bytes),
                hot: LruContainer::new(),
                hot_size: 0,
                max_in_memory_fraction: config.max_in_memory_fraction,
            }),
        })
    }

    /// Create the cache and restore it from its catalogue
    pub fn open(config: &DiskCacheConfig) -> Result<Self> {
        let cache = Self::new(config)?;
        let report = cache.restore()?;
        info!(
            restored = report.restored,
            skipped = report.skipped,
            rebuilt = report.rebuilt,
            "Disk cache opened"
        );
        Ok(cache)
    }

    /// `<root>/Cache/<cache_name>`
    pub fn cache_directory(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the backing file for `key` belongs
    pub fn entry_path(&self, key: CacheKey) -> PathBuf {
        layout::entry_path(&self.cache_dir, key, E::file_extension())
    }

    pub fn catalogue_path(&self) -> PathBuf {
        catalogue::catalogue_path(&self.cache_dir, E::catalogue_extension())
    }

    /// Insert a hot entry. An unmapped entry is mapped first; if that fails
    /// the error is returned and the cache is unchanged. An entry whose
    /// backing file was removed before the lock was taken (by the eviction
    /// of the same key) is rejected the same way.
    ///
    /// Returns whether an older entry was destroyed to make room.
    ///
    /// Backing files of destroyed entries are deleted under the write lock,
    /// so a concurrent re-add of the same key never loses its file.
    pub fn add(&self, key: CacheKey, mut entry: E) -> Result<bool> {
        if !entry.is_mapped() {
            let size = entry.size();
            entry.allocate(size, None)?;
        }
        let size = entry.size();
        let kind = entry.kind();

        let mut tiers = self.tiers.write();
        if !backing_file_matches(&entry) {
            return Err(CacheError::Mapping {
                path: entry.backing().path().to_path_buf(),
                reason: "backing file was removed before insertion".to_string(),
            });
        }
        tiers.unmark_hot(key);

        let insertion = tiers.cold.insert(key, entry);
        if let Some((evicted_key, _)) = &insertion.evicted {
            tiers.unmark_hot(*evicted_key);
        }
        tiers.mark_hot(key, size);
        debug!(key, size, ?kind, "Disk cache ADD");

        if let Some(old) = insertion.replaced {
            let keep_path = tiers
                .cold
                .peek(key)
                .and_then(|entry| entry.storage_path())
                .map(Path::to_path_buf);
            dispose(key, old, keep_path.as_deref());
        }
        Ok(match insertion.evicted {
            Some((evicted_key, entry)) => {
                dispose(evicted_key, entry, None);
                true
            }
            None => false,
        })
    }

    /// Look up `key`, promoting it in both tiers.
    ///
    /// A cold entry is mapped again and becomes hot, which may demote another
    /// hot entry. If re-mapping fails the entry is returned cold. An entry
    /// whose backing file disappeared or changed length is destroyed and
    /// reported as a miss.
    pub fn is_cached(&self, key: CacheKey) -> Option<EntryGuard<'_, E>> {
        let mut guard = self.tiers.write();
        let tiers = &mut *guard;

        let Some(entry) = tiers.cold.lookup(key) else {
            debug!(key, "Disk cache MISS");
            return None;
        };

        if entry.is_mapped() {
            tiers.hot.lookup(&key);
            debug!(key, "Disk cache HIT (hot)");
        } else if !backing_file_matches(entry) {
            warn!(key, path = ?entry.backing().path(), "Backing file lost or resized, dropping entry");
            tiers.cold.counters.hits -= 1;
            tiers.cold.counters.misses += 1;
            if let Some(lost) = tiers.cold.remove(key) {
                dispose(key, lost, None);
            }
            return None;
        } else {
            let size = entry.size();
            match entry.allocate(size, None) {
                Ok(()) => {
                    tiers.cold.counters.promotions += 1;
                    tiers.mark_hot(key, size);
                    debug!(key, "Disk cache HIT (promoted)");
                }
                Err(e) => {
                    warn!(key, error = %e, "Failed to re-map cold entry");
                }
            }
        }

        let guard = RwLockWriteGuard::downgrade(guard);
        RwLockReadGuard::try_map(guard, |tiers| tiers.cold.peek(key)).ok()
    }

    /// Whether `key` is catalogued, without touching recency
    pub fn contains(&self, key: CacheKey) -> bool {
        self.tiers.read().cold.contains(key)
    }

    /// Whether `key` is currently mapped
    pub fn is_in_memory(&self, key: CacheKey) -> bool {
        self.tiers.read().hot.contains(&key)
    }

    /// Remove an entry and delete its file. Returns whether it was present.
    pub fn remove(&self, key: CacheKey) -> bool {
        let mut tiers = self.tiers.write();
        tiers.unmark_hot(key);
        match tiers.cold.remove(key) {
            Some(entry) => {
                dispose(key, entry, None);
                true
            }
            None => false,
        }
    }

    /// Destroy every entry and delete its backing file
    pub fn clear(&self) {
        let mut tiers = self.tiers.write();
        let drained = tiers.drain();
        debug!(entries = drained.len(), "Disk cache CLEAR");
        for (key, entry) in drained {
            dispose(key, entry, None);
        }
    }

    /// Clear the cache and rebuild an empty directory skeleton, removing
    /// files the catalogue does not know about
    pub fn clear_disk_cache(&self) -> Result<()> {
        self.clear();
        layout::wipe_cache_directory(&self.cache_dir)
    }

    /// Unmap every hot entry. Returns how many were demoted.
    pub fn clear_in_memory_cache(&self) -> usize {
        let demoted = self.tiers.write().demote_all();
        debug!(demoted, "Disk cache cleared in-memory tier");
        demoted
    }

    /// Change the disk budget; the hot budget follows as the same fraction
    pub fn set_max_size(&self, max_size_bytes: u64) {
        let mut tiers = self.tiers.write();
        let evicted = tiers.cold.set_max_size(max_size_bytes);
        for (key, entry) in evicted {
            tiers.unmark_hot(key);
            dispose(key, entry, None);
        }
        tiers.shrink_hot();
    }

    /// Change the share of the disk budget that may stay mapped
    pub fn set_max_in_memory_fraction(&self, fraction: f64) -> Result<()> {
        validate_in_memory_fraction(fraction)?;
        let mut tiers = self.tiers.write();
        tiers.max_in_memory_fraction = fraction;
        tiers.shrink_hot();
        Ok(())
    }

    pub fn get_current_size(&self) -> u64 {
        self.tiers.read().cold.current_size()
    }

    /// Bytes currently mapped
    pub fn get_in_memory_size(&self) -> u64 {
        self.tiers.read().hot_size
    }

    pub fn get_max_size(&self) -> u64 {
        self.tiers.read().cold.max_size()
    }

    pub fn get_max_in_memory_size(&self) -> u64 {
        self.tiers.read().max_hot_size()
    }

    pub fn len(&self) -> usize {
        self.tiers.read().cold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mapped entries
    pub fn hot_len(&self) -> usize {
        self.tiers.read().hot.len()
    }

    pub fn report(&self) -> CacheReport {
        let tiers = self.tiers.read();
        CacheReport {
            hot_entries: tiers.hot.len(),
            hot_size_bytes: tiers.hot_size,
            ..tiers.cold.report()
        }
    }

    /// Demote every entry and write the catalogue, least recently used first.
    /// Returns the number of records written.
    pub fn save(&self) -> Result<usize> {
        let records: Vec<String> = {
            let mut tiers = self.tiers.write();
            tiers.demote_all();
            tiers
                .cold
                .iter()
                .map(|(key, entry)| entry.print_out(*key, &self.cache_dir))
                .collect()
        };

        let path = self.catalogue_path();
        let written = catalogue::write_catalogue(&path, E::cache_version(), &records)?;
        info!(?path, records = written, "Saved disk cache catalogue");
        Ok(written)
    }

    /// Reload entries from the catalogue as cold entries.
    ///
    /// A missing catalogue, a version mismatch or an unparsable record means
    /// the on-disk cache is stale: the in-memory tables are dropped and the
    /// directory is wiped and rebuilt. On success the catalogue is rewritten
    /// header-only, so a crash before the next `save` cannot resurrect stale
    /// records.
    pub fn restore(&self) -> Result<RestoreReport> {
        let path = self.catalogue_path();
        let version = E::cache_version();

        let parsed = match catalogue::read_catalogue(&path) {
            Ok(Some(catalogue)) if catalogue.version == version => catalogue
                .records
                .iter()
                .map(|record| E::parse_record(record, &self.cache_dir))
                .collect::<Result<Vec<_>>>(),
            Ok(Some(catalogue)) => Err(CacheError::VersionMismatch {
                expected: version.to_string(),
                found: catalogue.version,
            }),
            Ok(None) => Err(CacheError::InvalidRecord(format!(
                "no catalogue at {:?}",
                path
            ))),
            Err(e) => Err(e),
        };

        let entries = match parsed {
            Ok(entries) => entries,
            Err(e) => {
                info!(dir = ?self.cache_dir, reason = %e, "Disk cache is stale, rebuilding");
                self.rebuild()?;
                return Ok(RestoreReport {
                    rebuilt: true,
                    ..Default::default()
                });
            }
        };

        let mut report = RestoreReport::default();
        {
            let mut tiers = self.tiers.write();
            for (key, entry) in entries {
                if tiers.cold.contains(key) {
                    warn!(key, "Duplicate catalogue record, skipping");
                    report.skipped += 1;
                    continue;
                }
                if !backing_file_matches(&entry) {
                    warn!(key, path = ?entry.backing().path(), "Backing file missing or resized, skipping");
                    report.skipped += 1;
                    dispose(key, entry, None);
                    continue;
                }
                let insertion = tiers.cold.insert(key, entry);
                if let Some((evicted_key, evicted_entry)) = insertion.evicted {
                    tiers.unmark_hot(evicted_key);
                    dispose(evicted_key, evicted_entry, None);
                }
                report.restored += 1;
            }
        }

        catalogue::truncate_catalogue(&path, version)?;
        Ok(report)
    }

    /// Drop every entry without touching files, then wipe the directory
    fn rebuild(&self) -> Result<()> {
        drop(self.tiers.write().drain());
        layout::wipe_cache_directory(&self.cache_dir)?;
        catalogue::truncate_catalogue(&self.catalogue_path(), E::cache_version())
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.tiers.read().is_consistent()
    }
}
