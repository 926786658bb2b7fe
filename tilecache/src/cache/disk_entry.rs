//! Disk-backed cache entries.

use super::entry::CacheEntry;
use super::mmap::{MappingMode, MemoryMappedFile};
use crate::core::{CacheError, CacheKey, EntryKind, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entry whose bytes live in a memory-mapped file.
///
/// The entry is *mapped* (hot) between `allocate` and `deallocate`; once
/// deallocated, the file and its contents stay on disk so the entry can be
/// mapped again later.
#[derive(Debug)]
pub struct MemoryMappedEntry {
    file: MemoryMappedFile,
    size: u64,
}

impl MemoryMappedEntry {
    /// Describe an unmapped entry of `size` bytes stored at `path`
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            file: MemoryMappedFile::new(path),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_mapped(&self) -> bool {
        self.file.is_open()
    }

    /// Map the existing backing file again, keeping its contents
    pub fn map(&mut self) -> Result<()> {
        self.allocate(self.size, None)
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.file.data()
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.file.data_mut()
    }

    /// Flush the mapped bytes to the backing file
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }
}

impl CacheEntry for MemoryMappedEntry {
    fn size(&self) -> u64 {
        self.size
    }

    /// Create (or resize) the backing file to `byte_count` bytes and map it
    /// read/write. Bytes already in the file up to `byte_count` are kept.
    fn allocate(&mut self, byte_count: u64, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            if path != self.file.path() {
                self.file = MemoryMappedFile::new(path);
            }
        }

        if let Some(parent) = self.file.path().parent() {
            if !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            }
        }

        self.file
            .open(MappingMode::ReadWrite, None, 0, Some(byte_count))?;
        self.size = byte_count;
        Ok(())
    }

    fn deallocate(&mut self) {
        self.file.close();
    }

    fn discard(&mut self) -> Result<()> {
        self.file.close();
        match fs::remove_file(self.file.path()) {
            Ok(()) => {
                debug!(path = ?self.file.path(), "Removed backing file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(self.file.path(), e)),
        }
    }

    fn storage_path(&self) -> Option<&Path> {
        Some(self.file.path())
    }

    fn kind(&self) -> EntryKind {
        EntryKind::DiskBacked
    }
}

/// A cache entry stored in a memory-mapped file that can be catalogued.
///
/// Implementors choose their catalogue grammar through `print_out` and
/// `parse_record`. Records must fit on one line.
pub trait DiskEntry: CacheEntry + Sized {
    /// Name of the directory under `<root>/Cache/`
    fn cache_name() -> &'static str;

    /// First line of the catalogue; a mismatch on restore wipes the cache
    fn cache_version() -> &'static str;

    fn catalogue_extension() -> &'static str {
        "txt"
    }

    /// Extension of backing files
    fn file_extension() -> &'static str {
        "bin"
    }

    fn backing(&self) -> &MemoryMappedEntry;

    fn backing_mut(&mut self) -> &mut MemoryMappedEntry;

    fn is_mapped(&self) -> bool {
        self.backing().is_mapped()
    }

    /// Serialize the entry stored under `key` to a single line
    fn print_out(&self, key: CacheKey, cache_dir: &Path) -> String;

    /// Parse a line written by `print_out`. The returned entry is unmapped.
    fn parse_record(record: &str, cache_dir: &Path) -> Result<(CacheKey, Self)>;
}

/// Rendered image tile kept in the disk cache
#[derive(Debug)]
pub struct TileEntry {
    backing: MemoryMappedEntry,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
}

impl TileEntry {
    /// Describe an unmapped tile stored at `path`
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        let size = u64::from(width) * u64::from(height) * u64::from(bytes_per_pixel);
        Self {
            backing: MemoryMappedEntry::new(path, size),
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Create the backing file and map it, ready to be filled
    pub fn create(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> Result<Self> {
        let mut tile = Self::new(path, width, height, bytes_per_pixel);
        let size = tile.size();
        tile.allocate(size, None)?;
        Ok(tile)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    pub fn path(&self) -> &Path {
        self.backing.path()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.backing.data()
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.backing.data_mut()
    }
}

impl CacheEntry for TileEntry {
    fn size(&self) -> u64 {
        self.backing.size()
    }

    fn allocate(&mut self, byte_count: u64, path: Option<&Path>) -> Result<()> {
        self.backing.allocate(byte_count, path)
    }

    fn deallocate(&mut self) {
        self.backing.deallocate();
    }

    fn discard(&mut self) -> Result<()> {
        self.backing.discard()
    }

    fn storage_path(&self) -> Option<&Path> {
        self.backing.storage_path()
    }

    fn kind(&self) -> EntryKind {
        EntryKind::DiskBacked
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str, record: &str) -> Result<T> {
    field
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| CacheError::InvalidRecord(format!("bad {} in {:?}", name, record)))
}

impl DiskEntry for TileEntry {
    fn cache_name() -> &'static str {
        "TileCache"
    }

    fn cache_version() -> &'static str {
        "TileCache-1"
    }

    fn file_extension() -> &'static str {
        "tile"
    }

    fn backing(&self) -> &MemoryMappedEntry {
        &self.backing
    }

    fn backing_mut(&mut self) -> &mut MemoryMappedEntry {
        &mut self.backing
    }

    /// `<key:016x> <size> <width> <height> <bytes_per_pixel> <relative path>`
    fn print_out(&self, key: CacheKey, cache_dir: &Path) -> String {
        let path = self.path();
        let relative = path.strip_prefix(cache_dir).unwrap_or(path);
        format!(
            "{:016x} {} {} {} {} {}",
            key,
            self.size(),
            self.width,
            self.height,
            self.bytes_per_pixel,
            relative.display()
        )
    }

    fn parse_record(record: &str, cache_dir: &Path) -> Result<(CacheKey, Self)> {
        let mut fields = record.splitn(6, ' ');

        let key = fields
            .next()
            .and_then(|hex| CacheKey::from_str_radix(hex, 16).ok())
            .ok_or_else(|| CacheError::InvalidRecord(format!("bad key in {:?}", record)))?;
        let size: u64 = parse_field(fields.next(), "size", record)?;
        let width: u32 = parse_field(fields.next(), "width", record)?;
        let height: u32 = parse_field(fields.next(), "height", record)?;
        let bytes_per_pixel: u32 = parse_field(fields.next(), "bytes_per_pixel", record)?;
        let relative = fields
            .next()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| CacheError::InvalidRecord(format!("missing path in {:?}", record)))?;

        let tile = Self::new(cache_dir.join(relative), width, height, bytes_per_pixel);
        if tile.size() != size {
            return Err(CacheError::InvalidRecord(format!(
                "size {} does not match {}x{}x{} in {:?}",
                size, width, height, bytes_per_pixel, record
            )));
        }

        Ok((key, tile))
    }
}
