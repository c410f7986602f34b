//! memsys configuration
//!
//! Loaded from an optional TOML file with `MEMSYS_*` environment overrides:
//!
//! ```toml
//! min_chunk_size = 4096
//! max_chunk_size = 131072
//! prealloc_chunks = 0
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default smallest chunk size (4 KiB)
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 4 * 1024;
/// Default largest chunk size (128 KiB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 128 * 1024;

/// Buffer manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemsysConfig {
    /// Smallest slab chunk size (power of two)
    pub min_chunk_size: usize,
    /// Largest slab chunk size (power of two)
    pub max_chunk_size: usize,
    /// Idle chunks to seed each slab with
    pub prealloc_chunks: usize,
}

impl Default for MemsysConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            prealloc_chunks: 0,
        }
    }
}

impl MemsysConfig {
    /// Load from an optional TOML file, then apply `MEMSYS_*` env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("min_chunk_size", defaults.min_chunk_size as i64)
            .and_then(|b| b.set_default("max_chunk_size", defaults.max_chunk_size as i64))
            .and_then(|b| b.set_default("prealloc_chunks", defaults.prealloc_chunks as i64))
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let cfg: Self = builder
            .add_source(config::Environment::with_prefix("MEMSYS").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check chunk sizes are non-zero powers of two and ordered
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("min_chunk_size", self.min_chunk_size),
            ("max_chunk_size", self.max_chunk_size),
        ] {
            if !size.is_power_of_two() {
                return Err(Error::Config(format!(
                    "{} must be a non-zero power of two, got {}",
                    name, size
                )));
            }
        }

        if self.min_chunk_size > self.max_chunk_size {
            return Err(Error::Config(format!(
                "min_chunk_size {} exceeds max_chunk_size {}",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}
