use serde::Serialize;

/// 64-bit key supplied by the caller (a hash of whatever identifies the tile)
pub type CacheKey = u64;

/// Storage variant of a cache entry
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Heap buffer
    InMemory,
    /// Memory-mapped file
    DiskBacked,
}

/// Counters kept by a cache while it serves requests
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub demotions: u64,
    pub promotions: u64,
}

/// Snapshot of a cache's occupancy and activity
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheReport {
    /// Number of catalogued entries
    pub entries: usize,
    /// Sum of the sizes of all catalogued entries
    pub current_size_bytes: u64,
    /// Byte budget (0 = unbounded)
    pub max_size_bytes: u64,
    /// Entries currently mapped (disk caches only)
    pub hot_entries: usize,
    /// Bytes currently mapped (disk caches only)
    pub hot_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    /// Hot entries unmapped back to disk
    pub demotions: u64,
    /// Cold entries re-mapped on lookup
    pub promotions: u64,
}

impl CacheReport {
    pub(crate) fn with_counters(mut self, counters: &CacheCounters) -> Self {
        self.hits = counters.hits;
        self.misses = counters.misses;
        self.inserts = counters.inserts;
        self.evictions = counters.evictions;
        self.demotions = counters.demotions;
        self.promotions = counters.promotions;
        self
    }

    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
