//! Memory-mapped file wrapper.
//!
//! [`MemoryMappedFile`] exposes a fixed-size byte region backed by a path on
//! disk. The OS backend comes from `memmap2`, so the same code serves POSIX
//! and Windows targets. A failed open never leaves a partial mapping behind:
//! the wrapper is either fully mapped or unopened.

use crate::core::{CacheError, Result};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Protection of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    ReadOnly,
    /// Read/write; the file is created when missing
    ReadWrite,
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

struct OpenMapping {
    /// Kept open for the lifetime of the mapping
    _file: File,
    mapping: Mapping,
    offset: u64,
}

/// A file mapped into the address space, or nothing at all
pub struct MemoryMappedFile {
    path: PathBuf,
    open: Option<OpenMapping>,
}

impl std::fmt::Debug for MemoryMappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMappedFile")
            .field("path", &self.path)
            .field("mode", &self.mode())
            .field("len", &self.len())
            .finish()
    }
}

impl MemoryMappedFile {
    /// Create an unopened wrapper for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            open: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Mode of the current mapping
    pub fn mode(&self) -> Option<MappingMode> {
        self.open.as_ref().map(|open| match open.mapping {
            Mapping::ReadOnly(_) => MappingMode::ReadOnly,
            Mapping::ReadWrite(_) => MappingMode::ReadWrite,
        })
    }

    /// Length of the mapped region (0 when unopened)
    pub fn len(&self) -> usize {
        self.data().map_or(0, <[u8]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open the file and map it.
    ///
    /// * `length_hint` - bytes to map; `None` maps from `offset` to the end of the file
    /// * `offset` - file offset the mapping starts at
    /// * `truncate_size` - resize the file to this length before mapping
    ///
    /// Any existing mapping is closed first. On failure the wrapper is left
    /// unopened, and a file created by this call is removed again.
    pub fn open(
        &mut self,
        mode: MappingMode,
        length_hint: Option<usize>,
        offset: u64,
        truncate_size: Option<u64>,
    ) -> Result<()> {
        self.close();

        let existed = self.path.exists();
        match self.map(mode, length_hint, offset, truncate_size) {
            Ok(open) => {
                self.open = Some(open);
                debug!(path = ?self.path, ?mode, len = self.len(), "Mapped file");
                Ok(())
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to map file");
                if !existed && self.path.exists() {
                    if let Err(remove) = fs::remove_file(&self.path) {
                        warn!(path = ?self.path, error = %remove, "Failed to remove file after failed map");
                    }
                }
                Err(e)
            }
        }
    }

    fn map(
        &self,
        mode: MappingMode,
        length_hint: Option<usize>,
        offset: u64,
        truncate_size: Option<u64>,
    ) -> Result<OpenMapping> {
        let file = match mode {
            MappingMode::ReadOnly => File::open(&self.path),
            MappingMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path),
        }
        .map_err(|e| CacheError::io(&self.path, e))?;

        if let Some(size) = truncate_size {
            if mode == MappingMode::ReadOnly {
                return Err(self.mapping_error("cannot resize a read-only mapping"));
            }
            file.set_len(size)
                .map_err(|e| CacheError::io(&self.path, e))?;
        }

        let file_len = file
            .metadata()
            .map_err(|e| CacheError::io(&self.path, e))?
            .len();

        if offset > file_len {
            return Err(self.mapping_error(format!(
                "offset {} is past the end of the file ({} bytes)",
                offset, file_len
            )));
        }

        let available = file_len - offset;
        let map_len = match length_hint {
            Some(len) if len as u64 > available => {
                return Err(self.mapping_error(format!(
                    "cannot map {} bytes at offset {}, file has {} bytes",
                    len, offset, file_len
                )));
            }
            Some(len) => len,
            None => available as usize,
        };

        if map_len == 0 {
            return Err(self.mapping_error("cannot map an empty region"));
        }

        let mut options = MmapOptions::new();
        options.offset(offset).len(map_len);

        // SAFETY: the file handle is kept alive alongside the mapping and the
        // region lies within the file. Files under the cache directory are
        // owned by this process; external truncation is not supported.
        let mapping = match mode {
            MappingMode::ReadOnly => Mapping::ReadOnly(
                unsafe { options.map(&file) }.map_err(|e| CacheError::io(&self.path, e))?,
            ),
            MappingMode::ReadWrite => Mapping::ReadWrite(
                unsafe { options.map_mut(&file) }.map_err(|e| CacheError::io(&self.path, e))?,
            ),
        };

        Ok(OpenMapping {
            _file: file,
            mapping,
            offset,
        })
    }

    /// Resize the backing file to `new_len` bytes and remap it read/write
    pub fn resize(&mut self, new_len: u64) -> Result<()> {
        let offset = match &self.open {
            Some(open) => match open.mapping {
                Mapping::ReadWrite(_) => open.offset,
                Mapping::ReadOnly(_) => {
                    return Err(self.mapping_error("cannot resize a read-only mapping"));
                }
            },
            None => return Err(CacheError::NotMapped(self.path.clone())),
        };

        self.open(MappingMode::ReadWrite, None, offset, Some(new_len))
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> Result<()> {
        match &self.open {
            Some(OpenMapping {
                mapping: Mapping::ReadWrite(map),
                ..
            }) => map.flush().map_err(|e| CacheError::io(&self.path, e)),
            Some(_) => Ok(()),
            None => Err(CacheError::NotMapped(self.path.clone())),
        }
    }

    /// Unmap and close the file. Does nothing when unopened.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            if let Mapping::ReadWrite(map) = &open.mapping {
                if let Err(e) = map.flush() {
                    warn!(path = ?self.path, error = %e, "Failed to flush mapping on close");
                }
            }
            debug!(path = ?self.path, "Unmapped file");
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.open.as_ref().map(|open| match &open.mapping {
            Mapping::ReadOnly(map) => &map[..],
            Mapping::ReadWrite(map) => &map[..],
        })
    }

    /// Writable view; `None` unless mapped read/write
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match self.open.as_mut() {
            Some(OpenMapping {
                mapping: Mapping::ReadWrite(map),
                ..
            }) => Some(&mut map[..]),
            _ => None,
        }
    }

    fn mapping_error(&self, reason: impl Into<String>) -> CacheError {
        CacheError::Mapping {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl Drop for MemoryMappedFile {
    fn drop(&mut self) {
        self.close();
    }
}
