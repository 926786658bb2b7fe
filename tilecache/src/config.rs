use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{CacheError, Result};

/// Top-level configuration for both caches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub memory: MemoryCacheConfig,
    pub disk: DiskCacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// 0 = unbounded
    pub max_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Parent of the `Cache/` directory
    pub root_path: PathBuf,
    /// 0 = unbounded
    pub max_size_bytes: u64,
    /// Share of `max_size_bytes` allowed to stay memory-mapped, in (0, 1]
    pub max_in_memory_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `plain`
    pub format: String,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir(),
            max_size_bytes: 8 * 1024 * 1024 * 1024,
            max_in_memory_fraction: 0.25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

impl TileCacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: TileCacheConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_in_memory_fraction(self.disk.max_in_memory_fraction)?;
        match self.logging.format.as_str() {
            "json" | "plain" => Ok(()),
            other => Err(CacheError::InvalidConfig(format!(
                "logging.format must be json or plain, got {:?}",
                other
            ))),
        }
    }
}

pub(crate) fn validate_in_memory_fraction(fraction: f64) -> Result<()> {
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(CacheError::InvalidConfig(format!(
            "max_in_memory_fraction must be in (0, 1], got {}",
            fraction
        )))
    }
}
