use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to map {path:?}: {reason}")]
    Mapping { path: PathBuf, reason: String },

    #[error("Entry is not memory-mapped: {0:?}")]
    NotMapped(PathBuf),

    #[error("Invalid catalogue record: {0}")]
    InvalidRecord(String),

    #[error("Catalogue version mismatch - expected: {expected}, found: {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error means the on-disk cache is stale and should be rebuilt
    pub fn is_stale_catalogue(&self) -> bool {
        matches!(
            self,
            Self::InvalidRecord(_) | Self::VersionMismatch { .. }
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
