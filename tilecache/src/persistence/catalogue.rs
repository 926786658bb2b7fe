//! Plain-text catalogue of a disk cache.
//!
//! Line 1 holds the cache format version, every following line one entry
//! record in the grammar of the entry type. Each line ends with `\n`.

use crate::cache::layout::RESTORE_FILE_STEM;
use crate::core::{CacheError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parsed catalogue file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    pub version: String,
    pub records: Vec<String>,
}

/// `<cache_dir>/restoreFile.<ext>`
pub fn catalogue_path(cache_dir: &Path, extension: &str) -> PathBuf {
    cache_dir.join(format!("{}.{}", RESTORE_FILE_STEM, extension))
}

/// Write the version line followed by one line per record, then sync
pub fn write_catalogue<I, S>(path: &Path, version: &str, records: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", version).map_err(|e| CacheError::io(path, e))?;

    let mut count = 0;
    for record in records {
        let record = record.as_ref();
        if record.contains('\n') {
            return Err(CacheError::InvalidRecord(format!(
                "record spans multiple lines: {:?}",
                record
            )));
        }
        writeln!(writer, "{}", record).map_err(|e| CacheError::io(path, e))?;
        count += 1;
    }

    writer.flush().map_err(|e| CacheError::io(path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| CacheError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| CacheError::io(path, e))?;

    debug!(?path, records = count, "Wrote catalogue");
    Ok(count)
}

/// Rewrite the catalogue with its version line only
pub fn truncate_catalogue(path: &Path, version: &str) -> Result<()> {
    write_catalogue(path, version, std::iter::empty::<&str>()).map(|_| ())
}

/// Read a catalogue; `Ok(None)` when the file does not exist or is empty
pub fn read_catalogue(path: &Path) -> Result<Option<Catalogue>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    let mut lines = content.lines();
    let version = match lines.next() {
        Some(line) if !line.trim().is_empty() => line.trim().to_string(),
        _ => return Ok(None),
    };

    let records = lines
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    Ok(Some(Catalogue { version, records }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_catalogue_path() {
        assert_eq!(
            catalogue_path(Path::new("/c/Tiles"), "txt"),
            PathBuf::from("/c/Tiles/restoreFile.txt")
        );
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = catalogue_path(dir.path(), "txt");

        let written = write_catalogue(&path, "v3", ["a 1", "b 2"]).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "v3\na 1\nb 2\n");

        let catalogue = read_catalogue(&path).unwrap().unwrap();
        assert_eq!(catalogue.version, "v3");
        assert_eq!(catalogue.records, vec!["a 1".to_string(), "b 2".to_string()]);
    }

    #[test]
    fn test_missing_or_empty_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("restoreFile.txt");
        assert!(read_catalogue(&path).unwrap().is_none());

        fs::write(&path, "").unwrap();
        assert!(read_catalogue(&path).unwrap().is_none());
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("restoreFile.txt");
        fs::write(&path, "v1\n\nrecord\n\n").unwrap();

        let catalogue = read_catalogue(&path).unwrap().unwrap();
        assert_eq!(catalogue.records, vec!["record".to_string()]);
    }

    #[test]
    fn test_truncate_keeps_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("restoreFile.txt");
        write_catalogue(&path, "v1", ["x"]).unwrap();

        truncate_catalogue(&path, "v1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "v1\n");
    }

    #[test]
    fn test_multiline_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("restoreFile.txt");
        let err = write_catalogue(&path, "v1", ["a\nb"]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidRecord(_)));
    }
}
