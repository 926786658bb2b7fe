pub mod base;
pub mod disk;
pub mod disk_entry;
pub mod entry;
pub mod layout;
pub mod memory;
pub mod mmap;

pub use base::{Cache, EntryGuard};
pub use disk::{DiskCache, RestoreReport};
pub use disk_entry::{DiskEntry, MemoryMappedEntry, TileEntry};
pub use entry::{CacheEntry, InMemoryEntry};
pub use memory::MemoryCache;
pub use mmap::{MappingMode, MemoryMappedFile};
