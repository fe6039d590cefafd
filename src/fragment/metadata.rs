//! Fragment metadata
//!
//! Everything a reader needs to fetch tiles without scanning payload bytes:
//! per-tile byte ranges for every attribute, coordinate-tile MBRs and the
//! fragment's spatial descriptor.

use serde::{Deserialize, Serialize};

use crate::constants::FRAGMENT_METADATA_FILENAME;
use crate::error::Result;
use crate::storage::codec::{decode_checksummed, encode_checksummed};
use crate::tile::Compressor;
use crate::vfs::{self, Vfs};

/// Location of one tile inside an attribute file
///
/// Sizes are on-disk (compressed) bytes; the `raw_*` sizes are the
/// decompressed payload lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    /// Offset in `<attr>.mdb` (values, or var offsets)
    pub offset: u64,
    /// Bytes in `<attr>.mdb`
    pub size: u64,
    pub raw_size: u64,
    /// Offset in `<attr>_var.mdb` (var-sized attributes)
    pub var_offset: u64,
    /// Bytes in `<attr>_var.mdb`
    pub var_size: u64,
    pub var_raw_size: u64,
    pub cell_num: u64,
    pub compressor: Compressor,
}

/// Persisted description of one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    /// Visible directory name
    name: String,
    dense: bool,
    timestamp_ms: u64,
    sequence: u64,
    /// Dense fragments: the subarray written. Sparse: union of tile MBRs
    non_empty_domain: Vec<u8>,
    cell_num: u64,
    /// `tiles[attribute_id][tile_idx]`, the coordinates at `attribute_num`
    tiles: Vec<Vec<TileEntry>>,
    /// One MBR per coordinate tile
    mbrs: Vec<Vec<u8>>,
    /// First and last coordinates of each coordinate tile
    bounding_coords: Vec<(Vec<u8>, Vec<u8>)>,
}

impl FragmentMetadata {
    pub(crate) fn new(
        name: String,
        dense: bool,
        timestamp_ms: u64,
        sequence: u64,
        non_empty_domain: Vec<u8>,
        attribute_num: usize,
    ) -> Self {
        Self {
            name,
            dense,
            timestamp_ms,
            sequence,
            non_empty_domain,
            cell_num: 0,
            tiles: vec![Vec::new(); attribute_num + 1],
            mbrs: Vec::new(),
            bounding_coords: Vec::new(),
        }
    }

    /// Load and verify `__fragment_metadata.mdb` from a fragment directory
    pub fn load(vfs: &dyn Vfs, fragment_uri: &str, verify: bool) -> Result<Self> {
        let bytes = vfs.read_all(&vfs::join(fragment_uri, FRAGMENT_METADATA_FILENAME))?;
        decode_checksummed(&bytes, verify)
    }

    pub(crate) fn store(&self, vfs: &dyn Vfs, fragment_uri: &str) -> Result<()> {
        let bytes = encode_checksummed(self)?;
        vfs.write_to_file(&vfs::join(fragment_uri, FRAGMENT_METADATA_FILENAME), &bytes)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dense(&self) -> bool {
        self.dense
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn non_empty_domain(&self) -> &[u8] {
        &self.non_empty_domain
    }

    pub fn cell_num(&self) -> u64 {
        self.cell_num
    }

    /// Number of tiles (identical for every stored attribute)
    pub fn tile_num(&self) -> usize {
        self.tiles.first().map(|t| t.len()).unwrap_or(0)
    }

    /// Tile entries of one attribute (empty for coordinates of dense fragments)
    pub fn tiles(&self, attribute_id: usize) -> &[TileEntry] {
        self.tiles.get(attribute_id).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn mbrs(&self) -> &[Vec<u8>] {
        &self.mbrs
    }

    pub fn bounding_coords(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.bounding_coords
    }

    /// Creation order key
    pub(crate) fn order_key(&self) -> (u64, u64, &str) {
        (self.timestamp_ms, self.sequence, &self.name)
    }

    // =========================================================================
    // Write-side bookkeeping
    // =========================================================================

    pub(crate) fn push_tile(&mut self, attribute_id: usize, entry: TileEntry) {
        self.tiles[attribute_id].push(entry);
    }

    pub(crate) fn push_coords_summary(&mut self, mbr: Vec<u8>, bounding: (Vec<u8>, Vec<u8>)) {
        self.mbrs.push(mbr);
        self.bounding_coords.push(bounding);
    }

    pub(crate) fn add_cells(&mut self, cells: u64) {
        self.cell_num += cells;
    }

    pub(crate) fn set_non_empty_domain(&mut self, domain: Vec<u8>) {
        self.non_empty_domain = domain;
    }
}
