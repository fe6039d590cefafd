//! Configuration for MosaicDB
//!
//! Centralized configuration with sensible defaults.

use crate::constants;
use crate::error::{MosaicError, Result};

/// Main configuration for a MosaicDB storage manager
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // I/O Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of bytes handed to the filesystem in one write call.
    /// Larger writes are split into chunks of this size.
    pub max_write_bytes: usize,

    /// Verify CRC32 checksums when loading schemas and fragment metadata
    pub verify_checksums: bool,

    // -------------------------------------------------------------------------
    // Schema Configuration
    // -------------------------------------------------------------------------
    /// Maximum length of attribute and dimension names
    pub name_max_len: usize,

    /// Sparse tile capacity (cells per tile) for schemas that don't set one
    pub default_capacity: u64,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// Number of tiles each open fragment keeps in memory during reads
    pub tile_cache_capacity: usize,

    /// Estimated cells per slab of a row- or column-major sparse read.
    /// Bounds the cells sorted in memory at once.
    pub sort_slab_cells: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_write_bytes: constants::MAX_WRITE_BYTES,
            verify_checksums: true,
            name_max_len: constants::NAME_MAX_LEN,
            default_capacity: constants::DEFAULT_CAPACITY,
            tile_cache_capacity: 1024,
            sort_slab_cells: 1 << 16,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that every size and capacity is usable
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max_write_bytes", self.max_write_bytes as u64),
            ("name_max_len", self.name_max_len as u64),
            ("default_capacity", self.default_capacity),
            ("tile_cache_capacity", self.tile_cache_capacity as u64),
            ("sort_slab_cells", self.sort_slab_cells),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(MosaicError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the maximum bytes per filesystem write call
    pub fn max_write_bytes(mut self, bytes: usize) -> Self {
        self.config.max_write_bytes = bytes;
        self
    }

    /// Enable or disable checksum verification on load
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    /// Set the maximum attribute/dimension name length
    pub fn name_max_len(mut self, len: usize) -> Self {
        self.config.name_max_len = len;
        self
    }

    /// Set the default sparse tile capacity
    pub fn default_capacity(mut self, capacity: u64) -> Self {
        self.config.default_capacity = capacity;
        self
    }

    /// Set the per-fragment tile cache capacity
    pub fn tile_cache_capacity(mut self, tiles: usize) -> Self {
        self.config.tile_cache_capacity = tiles;
        self
    }

    /// Set the cell budget of one sorted read slab
    pub fn sort_slab_cells(mut self, cells: u64) -> Self {
        self.config.sort_slab_cells = cells;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
