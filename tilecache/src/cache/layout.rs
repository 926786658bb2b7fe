//! On-disk layout of a disk cache.
//!
//! ```text
//! <root>/Cache/<cache_name>/
//!     restoreFile.<ext>
//!     00/ 01/ .. ff/          one shard per leading key byte
//!         <key:016x>.<ext>
//! ```

use crate::core::{CacheError, CacheKey, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory under the root that holds every named cache
pub const CACHE_DIR_NAME: &str = "Cache";

/// One shard per value of the key's most significant byte
pub const SHARD_COUNT: usize = 256;

/// File stem of the catalogue written by `save`
pub const RESTORE_FILE_STEM: &str = "restoreFile";

/// `<root>/Cache/<cache_name>`
pub fn cache_directory(root: &Path, cache_name: &str) -> PathBuf {
    root.join(CACHE_DIR_NAME).join(cache_name)
}

/// Shard of a key: its most significant byte
pub fn shard_index(key: CacheKey) -> u8 {
    (key >> 56) as u8
}

/// Two lowercase hex digits, `00`..`ff`
pub fn shard_dir_name(index: u8) -> String {
    format!("{:02x}", index)
}

/// Path of the backing file for `key`
pub fn entry_path(cache_dir: &Path, key: CacheKey, extension: &str) -> PathBuf {
    cache_dir
        .join(shard_dir_name(shard_index(key)))
        .join(format!("{:016x}.{}", key, extension))
}

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

fn all_shards_present(cache_dir: &Path) -> bool {
    (0..=u8::MAX).all(|index| cache_dir.join(shard_dir_name(index)).is_dir())
}

/// Create the cache directory and its 256 shard directories.
///
/// Returns `false` without touching the disk when every shard already
/// exists, `true` when anything had to be created.
pub fn initialize_sub_directories(cache_dir: &Path) -> Result<bool> {
    if all_shards_present(cache_dir) {
        return Ok(false);
    }

    fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
    for index in 0..=u8::MAX {
        let shard = cache_dir.join(shard_dir_name(index));
        if !shard.is_dir() {
            fs::create_dir(&shard).map_err(|e| CacheError::io(&shard, e))?;
        }
    }

    debug!(dir = ?cache_dir, "Initialized {} shard directories", SHARD_COUNT);
    Ok(true)
}

/// Delete everything under the cache directory and rebuild the skeleton
pub fn wipe_cache_directory(cache_dir: &Path) -> Result<()> {
    if cache_dir.exists() {
        fs::remove_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
    }
    initialize_sub_directories(cache_dir)?;
    info!(dir = ?cache_dir, "Wiped disk cache directory");
    Ok(())
}
