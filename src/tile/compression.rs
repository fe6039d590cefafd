//! Tile compression
//!
//! Every tile payload is compressed on its own right before it is appended
//! to an attribute file, and decompressed right after it is read back.
//! The compressor of each tile is recorded in the fragment metadata next to
//! the compressed and raw sizes, so a tile can be decoded without consulting
//! the schema.
//!
//! ```text
//! ┌────────────────┬──────────────────────────────┬───────────────┐
//! │ Compressor     │ Encoding                     │ Level         │
//! ├────────────────┼──────────────────────────────┼───────────────┤
//! │ NoCompression  │ raw bytes                    │ ignored       │
//! │ Zstd           │ zstd frame                   │ -1 = default  │
//! │ Lz4            │ lz4 block, u32 size prefix   │ ignored       │
//! └────────────────┴──────────────────────────────┴───────────────┘
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};

/// Level meaning "the compressor's default"
pub const DEFAULT_COMPRESSION_LEVEL: i32 = -1;

/// Compression applied to the tiles of one attribute (or the coordinates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compressor {
    #[default]
    NoCompression,
    Zstd,
    Lz4,
}

impl Compressor {
    /// Upper-case name used in schema dumps
    pub fn name(&self) -> &'static str {
        match self {
            Compressor::NoCompression => "NO_COMPRESSION",
            Compressor::Zstd => "ZSTD",
            Compressor::Lz4 => "LZ4",
        }
    }

    /// Compress one tile payload
    pub fn compress<'a>(&self, level: i32, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Compressor::NoCompression => Ok(Cow::Borrowed(data)),
            Compressor::Zstd => {
                let level = if level < 0 {
                    zstd::DEFAULT_COMPRESSION_LEVEL
                } else {
                    level
                };
                zstd::bulk::compress(data, level)
                    .map(Cow::Owned)
                    .map_err(|e| MosaicError::Compression(format!("zstd compression failed: {}", e)))
            }
            Compressor::Lz4 => Ok(Cow::Owned(lz4_flex::compress_prepend_size(data))),
        }
    }

    /// Decompress one tile payload of `raw_size` bytes
    pub fn decompress<'a>(&self, data: &'a [u8], raw_size: usize) -> Result<Cow<'a, [u8]>> {
        let raw: Cow<'a, [u8]> = match self {
            Compressor::NoCompression => Cow::Borrowed(data),
            Compressor::Zstd => Cow::Owned(zstd::bulk::decompress(data, raw_size).map_err(|e| {
                MosaicError::Compression(format!("zstd decompression failed: {}", e))
            })?),
            Compressor::Lz4 => Cow::Owned(lz4_flex::decompress_size_prepended(data).map_err(
                |e| MosaicError::Compression(format!("lz4 decompression failed: {}", e)),
            )?),
        };

        if raw.len() != raw_size {
            return Err(MosaicError::Corruption(format!(
                "{} tile decoded to {} bytes, expected {}",
                self.name(),
                raw.len(),
                raw_size
            )));
        }
        Ok(raw)
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
