//! Cache entry capability and the heap-backed entry.

use crate::core::{EntryKind, Result};
use std::path::Path;

/// A unit of cached data that owns its storage exclusively.
///
/// An entry knows its byte size and how to acquire (`allocate`) and release
/// (`deallocate`) its storage. Entries are moved into a cache and handed back
/// out on eviction, so they are never shared.
pub trait CacheEntry: Send + Sync {
    /// Size in bytes charged against the cache budget
    fn size(&self) -> u64;

    /// Acquire `byte_count` bytes of storage, optionally backed by `path`
    fn allocate(&mut self, byte_count: u64, path: Option<&Path>) -> Result<()>;

    /// Release the storage
    fn deallocate(&mut self);

    /// Cleanup when the entry is destroyed by the cache.
    ///
    /// Disk-backed entries also delete their backing file here.
    fn discard(&mut self) -> Result<()> {
        self.deallocate();
        Ok(())
    }

    /// File that backs this entry, if any
    fn storage_path(&self) -> Option<&Path> {
        None
    }

    fn kind(&self) -> EntryKind;
}

/// Entry whose bytes live in a heap buffer
#[derive(Debug, Default)]
pub struct InMemoryEntry {
    data: Option<Vec<u8>>,
}

impl InMemoryEntry {
    /// Create an entry with no storage yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an already allocated entry holding `bytes`
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { data: Some(bytes) }
    }

    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.data.as_deref_mut()
    }
}

impl CacheEntry for InMemoryEntry {
    fn size(&self) -> u64 {
        self.data.as_ref().map_or(0, |data| data.len() as u64)
    }

    fn allocate(&mut self, byte_count: u64, _path: Option<&Path>) -> Result<()> {
        self.data = Some(vec![0u8; byte_count as usize]);
        Ok(())
    }

    fn deallocate(&mut self) {
        self.data = None;
    }

    fn kind(&self) -> EntryKind {
        EntryKind::InMemory
    }
}
