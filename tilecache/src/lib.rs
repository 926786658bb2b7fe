pub mod cache;
pub mod config;
pub mod core;
pub mod logging;
pub mod persistence;

// Re-export commonly used types
pub use cache::{
    Cache, CacheEntry, DiskCache, DiskEntry, EntryGuard, InMemoryEntry, MemoryCache,
    MemoryMappedEntry, MemoryMappedFile, RestoreReport, TileEntry,
};
pub use config::{DiskCacheConfig, LoggingConfig, MemoryCacheConfig, TileCacheConfig};
pub use core::{CacheError, CacheKey, CacheReport, EntryKind, LruContainer, Result};
