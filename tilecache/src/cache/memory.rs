use super::base::Cache;
use super::entry::InMemoryEntry;
use crate::config::MemoryCacheConfig;
use crate::core::CacheKey;
use tracing::info;

/// Cache restricted to heap entries
pub type MemoryCache = Cache<InMemoryEntry>;

impl Cache<InMemoryEntry> {
    /// Create a memory cache from its configuration
    pub fn from_config(config: &MemoryCacheConfig) -> Self {
        info!(
            "Initializing memory cache with max_size={} bytes",
            config.max_size_bytes
        );
        Self::new(config.max_size_bytes)
    }

    /// Store `bytes` under `key` as a heap entry
    pub fn add_bytes(&self, key: CacheKey, bytes: Vec<u8>) -> bool {
        self.add(key, InMemoryEntry::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheEntry;
    use std::sync::Arc;
    use std::thread;

    fn tile(size: usize, fill: u8) -> InMemoryEntry {
        InMemoryEntry::from_bytes(vec![fill; size])
    }

    #[test]
    fn test_add_and_lookup() {
        let cache = MemoryCache::new(1024);
        assert!(!cache.add(1, tile(100, 1)));

        let entry = cache.is_cached(1).unwrap();
        assert_eq!(entry.size(), 100);
        assert_eq!(entry.data().unwrap()[0], 1);
        drop(entry);

        assert!(cache.is_cached(2).is_none());
        let report = cache.report();
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 1);
        assert_eq!(report.inserts, 1);
    }

    #[test]
    fn test_byte_budget_evicts_lru() {
        // Room for three 100-byte tiles before the budget check trips
        let cache = MemoryCache::new(300);
        cache.add(1, tile(100, 1)); // a
        cache.add(2, tile(100, 2)); // b
        cache.add(3, tile(100, 3)); // c
        assert!(cache.is_cached(1).is_some());

        let evicted = cache.add(4, tile(100, 4)); // d
        assert!(evicted);
        assert!(!cache.contains(2), "b was least recently used");
        assert!(cache.contains(1));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
        assert_eq!(cache.get_current_size(), 300);
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_budget_check_uses_bytes_not_count() {
        let cache = MemoryCache::new(1000);
        for key in 0..10 {
            assert!(!cache.add(key, tile(10, 0)));
        }
        assert_eq!(cache.len(), 10);

        // One big entry brings the cache over budget, the next insert evicts
        assert!(!cache.add(100, tile(990, 0)));
        assert_eq!(cache.get_current_size(), 1090);
        assert!(cache.add(101, tile(10, 0)));
        assert!(!cache.contains(0));
        assert_eq!(cache.get_current_size(), 1090);
    }

    #[test]
    fn test_keeps_most_recent_entries_within_one_entry_of_budget() {
        let cache = MemoryCache::new(500);
        for key in 0..20u64 {
            cache.add(key, tile(100, key as u8));
        }

        let kept: Vec<u64> = (0..20).filter(|key| cache.contains(*key)).collect();
        assert_eq!(kept, vec![15, 16, 17, 18, 19]);
        assert_eq!(cache.get_current_size(), 500);
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_unbounded_cache_never_evicts() {
        let cache = MemoryCache::new(0);
        for key in 0..50 {
            assert!(!cache.add(key, tile(1000, 0)));
        }
        assert_eq!(cache.len(), 50);
        assert_eq!(cache.evict_bytes(10_000), 0);
    }

    #[test]
    fn test_replace_existing_key_adjusts_size() {
        let cache = MemoryCache::new(1000);
        cache.add(7, tile(100, 1));
        cache.add(7, tile(40, 2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_current_size(), 40);
        assert_eq!(cache.is_cached(7).unwrap().data().unwrap()[0], 2);
    }

    #[test]
    fn test_remove() {
        let cache = MemoryCache::new(1000);
        cache.add_bytes(1, vec![0; 10]);
        assert!(cache.remove(1));
        assert!(!cache.remove(1));
        assert_eq!(cache.get_current_size(), 0);
    }

    #[test]
    fn test_clear_twice() {
        let cache = MemoryCache::new(1000);
        cache.add_bytes(1, vec![0; 10]);
        cache.add_bytes(2, vec![0; 10]);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get_current_size(), 0);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get_current_size(), 0);
    }

    #[test]
    fn test_set_max_size_shrinks() {
        let cache = MemoryCache::new(1000);
        for key in 0..10 {
            cache.add(key, tile(100, 0));
        }
        let _ = cache.is_cached(0);

        cache.set_max_size(300);
        assert_eq!(cache.get_max_size(), 300);
        assert_eq!(cache.get_current_size(), 300);
        // Key 0 was promoted, so it survives alongside the two newest
        assert!(cache.contains(0));
        assert!(cache.contains(8));
        assert!(cache.contains(9));
        assert_eq!(cache.report().evictions, 7);
    }

    #[test]
    fn test_evict_bytes_frees_room() {
        let cache = MemoryCache::new(1000);
        for key in 0..10 {
            cache.add(key, tile(100, 0));
        }
        assert_eq!(cache.evict_bytes(250), 3);
        assert_eq!(cache.get_current_size(), 700);
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn test_from_config() {
        let cache = MemoryCache::from_config(&MemoryCacheConfig {
            max_size_bytes: 4096,
        });
        assert_eq!(cache.get_max_size(), 4096);
    }

    #[test]
    fn test_concurrent_adds_keep_accounting_in_sync() {
        let cache = Arc::new(MemoryCache::new(64 * 1024));
        let threads = 8;
        let per_thread = 500u64;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        let key = (t as u64) << 32 | i;
                        cache.add(key, tile(128, t as u8));
                        if i % 3 == 0 {
                            let _ = cache.is_cached(key);
                        }
                        if i % 11 == 0 {
                            cache.remove(key.wrapping_sub(1));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.is_consistent());
        let report = cache.report();
        assert_eq!(report.entries, cache.len());
        assert_eq!(report.inserts, threads as u64 * per_thread);
        assert!(cache.get_current_size() <= 64 * 1024 + 128);
    }
}
