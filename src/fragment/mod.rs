//! Fragment Module
//!
//! A fragment is one write epoch of an array: an immutable directory of
//! attribute files plus its metadata. Fragments are written append-only,
//! one tile at a time per attribute, and become visible to readers only
//! once finalized.
//!
//! ## Directory Layout
//! ```text
//! <array>/.__<name>/          while being written (ignored by readers)
//! <array>/__<name>/           after finalize
//!   <attr>.mdb                fixed values, or var offsets (tile-relative u64)
//!   <attr>_var.mdb            var values
//!   __coords.mdb              coordinate tuples (sparse fragments)
//!   __fragment_metadata.mdb
//! ```
//!
//! ## Lifecycle
//! ```text
//! create ──► write* ──► finalize ──► visible
//!    │                     │
//!    └──── drop/discard ───┴──► hidden directory removed
//! ```

mod metadata;
mod name;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::{FILE_SUFFIX, TEMP_FRAGMENT_PREFIX, VAR_FILE_SUFFIX};
use crate::datatype::{decode_values, encode_values};
use crate::error::{MosaicError, Result};
use crate::query::QueryBuffer;
use crate::schema::ArraySchema;
use crate::storage::Array;
use crate::tile::{Tile, TileType};
use crate::vfs::{self, Vfs};

pub use metadata::{FragmentMetadata, TileEntry};
use name::FragmentName;

/// One fragment of an array, opened for writing or for reading
pub struct Fragment {
    array: Array,
    /// Visible URI (the directory only exists there after finalize)
    uri: String,
    metadata: FragmentMetadata,
    /// Present while the fragment is being written
    writer: Option<FragmentWriter>,
    /// Read-side cache keyed by (attribute id, tile index)
    tile_cache: HashMap<(usize, u64), Arc<Tile>>,
}

/// Write-side state of a fragment
struct FragmentWriter {
    temp_uri: String,
    /// Attribute ids stored in this fragment, in file order
    stored: Vec<usize>,
    /// Tile being filled, one per stored attribute
    tiles: Vec<Tile>,
    /// (fixed/offsets file size, var file size) per stored attribute
    file_sizes: Vec<(u64, u64)>,
    cells_in_tile: u64,
    /// Dense fragments: cells per tile, and the total the subarray holds
    dense_tile_sizes: Vec<u64>,
    dense_expected: u64,
    /// Reject sparse cells that arrive out of global order
    check_order: bool,
    last_coords: Option<Vec<u8>>,
}

impl Fragment {
    // =========================================================================
    // Write Path
    // =========================================================================

    /// Create a new, empty fragment for writing
    ///
    /// Dense fragments cover `subarray` and store no coordinates. Sparse
    /// fragments store coordinates and compute their non-empty domain at
    /// finalize.
    pub(crate) fn create(
        array: &Array,
        dense: bool,
        subarray: Vec<u8>,
        check_order: bool,
    ) -> Result<Self> {
        let schema = array.schema();
        let FragmentName {
            name,
            timestamp_ms,
            sequence,
        } = FragmentName::generate();

        let uri = vfs::join(array.uri(), &name);
        let temp_uri = vfs::join(array.uri(), &format!("{}{}", TEMP_FRAGMENT_PREFIX, &name[2..]));

        let stored: Vec<usize> = if dense {
            (0..schema.attribute_num()).collect()
        } else {
            (0..=schema.attribute_num()).collect()
        };

        let (dense_tile_sizes, dense_expected) = if dense {
            let sizes = dense_tile_sizes(schema, &subarray)?;
            let total = sizes.iter().sum();
            (sizes, total)
        } else {
            (Vec::new(), 0)
        };

        array.vfs().create_dir(&temp_uri)?;
        debug!(fragment = %name, dense, "Created fragment");

        let tiles = stored.iter().map(|&id| new_tile(schema, id, 0)).collect();
        let non_empty_domain = if dense { subarray } else { Vec::new() };

        Ok(Self {
            array: array.clone(),
            uri,
            metadata: FragmentMetadata::new(
                name,
                dense,
                timestamp_ms,
                sequence,
                non_empty_domain,
                schema.attribute_num(),
            ),
            writer: Some(FragmentWriter {
                temp_uri,
                file_sizes: vec![(0, 0); stored.len()],
                stored,
                tiles,
                cells_in_tile: 0,
                dense_tile_sizes,
                dense_expected,
                check_order,
                last_coords: None,
            }),
            tile_cache: HashMap::new(),
        })
    }

    /// Append cells, one buffer per entry of `attribute_ids`
    ///
    /// Every stored attribute must be present and all buffers must hold the
    /// same number of cells. Full tiles are flushed as they fill up.
    pub(crate) fn write(&mut self, attribute_ids: &[usize], buffers: &[QueryBuffer]) -> Result<()> {
        let Fragment {
            array,
            metadata,
            writer,
            ..
        } = self;
        let writer = writer.as_mut().ok_or_else(|| {
            MosaicError::Query(format!("Fragment {} is not open for writing", metadata.name()))
        })?;
        let schema = array.schema();
        let vfs = array.vfs();

        // Step 1: Match buffers to stored attributes and count cells
        let mut sources = Vec::with_capacity(writer.stored.len());
        let mut cell_num: Option<usize> = None;
        for &id in &writer.stored {
            let idx = attribute_ids.iter().position(|&a| a == id).ok_or_else(|| {
                MosaicError::Query(format!(
                    "Missing buffer for attribute '{}'",
                    schema.attribute_name(id)
                ))
            })?;
            let n = buffers[idx].cell_num(schema.cell_size(id))?;
            match cell_num {
                Some(expected) if expected != n => {
                    return Err(MosaicError::Query(format!(
                        "Attribute '{}' holds {} cells, expected {}",
                        schema.attribute_name(id),
                        n,
                        expected
                    )))
                }
                _ => cell_num = Some(n),
            }
            sources.push((idx, schema.cell_size(id)));
        }
        let cell_num = cell_num.unwrap_or(0);

        if metadata.dense() && metadata.cell_num() + cell_num as u64 > writer.dense_expected {
            return Err(MosaicError::Query(format!(
                "Dense fragment covers {} cells; cannot write {} more after {}",
                writer.dense_expected,
                cell_num,
                metadata.cell_num()
            )));
        }

        // Step 2: Sparse cells must arrive in global order
        if writer.check_order && !metadata.dense() {
            let coords_slot = writer.stored.len() - 1;
            let (idx, cell_size) = sources[coords_slot];
            for i in 0..cell_num {
                let coords = buffers[idx].cell(i, cell_size);
                if let Some(last) = &writer.last_coords {
                    if schema.cmp_global(last, coords) == std::cmp::Ordering::Greater {
                        return Err(MosaicError::Query(
                            "Cells are not in global order".to_string(),
                        ));
                    }
                }
                writer.last_coords = Some(coords.to_vec());
            }
        }

        // Step 3: Append cell by cell, flushing full tiles
        for i in 0..cell_num {
            for (slot, &(idx, cell_size)) in sources.iter().enumerate() {
                let cell = buffers[idx].cell(i, cell_size);
                let tile = &mut writer.tiles[slot];
                if tile.var_size() {
                    tile.append_var_cell(cell)?;
                } else {
                    tile.append_cell(cell)?;
                }
            }
            writer.cells_in_tile += 1;
            metadata.add_cells(1);

            let limit = if metadata.dense() {
                writer
                    .dense_tile_sizes
                    .get(metadata.tile_num())
                    .copied()
                    .unwrap_or(u64::MAX)
            } else {
                schema.capacity()
            };
            if writer.cells_in_tile >= limit {
                writer.flush(vfs, schema, metadata)?;
            }
        }
        Ok(())
    }

    /// Flush pending tiles, persist metadata and make the fragment visible
    ///
    /// Returns `false` when nothing was written; the hidden directory is then
    /// removed and no fragment appears. Reading fragments finalize trivially.
    pub fn finalize(&mut self) -> Result<bool> {
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(false),
        };

        match self.publish(&mut writer) {
            Ok(published) => Ok(published),
            Err(e) => {
                warn!(fragment = %self.metadata.name(), error = %e, "Finalize failed, discarding fragment");
                remove_dir(self.array.vfs(), &writer.temp_uri);
                Err(e)
            }
        }
    }

    fn publish(&mut self, writer: &mut FragmentWriter) -> Result<bool> {
        let schema = self.array.schema();
        let vfs = self.array.vfs();
        writer.flush(vfs, schema, &mut self.metadata)?;

        if self.metadata.cell_num() == 0 {
            vfs.delete_dir(&writer.temp_uri)?;
            debug!(fragment = %self.metadata.name(), "Dropped empty fragment");
            return Ok(false);
        }

        if self.metadata.dense() {
            if self.metadata.cell_num() != writer.dense_expected {
                return Err(MosaicError::Query(format!(
                    "Dense fragment received {} cells, its subarray holds {}",
                    self.metadata.cell_num(),
                    writer.dense_expected
                )));
            }
        } else {
            let mut mbrs = self.metadata.mbrs().iter();
            if let Some(first) = mbrs.next() {
                let mut domain = first.clone();
                for mbr in mbrs {
                    schema.union_rect(&mut domain, mbr);
                }
                self.metadata.set_non_empty_domain(domain);
            }
        }

        self.metadata.store(vfs, &writer.temp_uri)?;
        vfs.move_dir(&writer.temp_uri, &self.uri)?;
        info!(
            fragment = %self.metadata.name(),
            cells = self.metadata.cell_num(),
            tiles = self.metadata.tile_num(),
            "Finalized fragment"
        );
        Ok(true)
    }

    /// Throw away an unfinalized fragment
    pub(crate) fn discard(&mut self) {
        if let Some(writer) = self.writer.take() {
            warn!(fragment = %self.metadata.name(), "Discarding unfinalized fragment");
            remove_dir(self.array.vfs(), &writer.temp_uri);
        }
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Open an existing fragment from its metadata
    pub(crate) fn open(array: &Array, metadata: FragmentMetadata) -> Self {
        Self {
            array: array.clone(),
            uri: vfs::join(array.uri(), metadata.name()),
            metadata,
            writer: None,
            tile_cache: HashMap::new(),
        }
    }

    /// Fetch one tile of an attribute (or of the coordinates)
    pub fn tile(&mut self, attribute_id: usize, tile_idx: u64) -> Result<Arc<Tile>> {
        if let Some(tile) = self.tile_cache.get(&(attribute_id, tile_idx)) {
            return Ok(Arc::clone(tile));
        }

        let tile = Arc::new(self.load_tile(attribute_id, tile_idx)?);
        if self.tile_cache.len() >= self.array.config().tile_cache_capacity {
            self.tile_cache.clear();
        }
        self.tile_cache
            .insert((attribute_id, tile_idx), Arc::clone(&tile));
        Ok(tile)
    }

    fn load_tile(&self, attribute_id: usize, tile_idx: u64) -> Result<Tile> {
        let schema = self.array.schema();
        let vfs = self.array.vfs();
        let entry = self
            .metadata
            .tiles(attribute_id)
            .get(tile_idx as usize)
            .copied()
            .ok_or_else(|| {
                MosaicError::Corruption(format!(
                    "Fragment {} has no tile {} for attribute '{}'",
                    self.metadata.name(),
                    tile_idx,
                    schema.attribute_name(attribute_id)
                ))
            })?;

        let name = schema.attribute_name(attribute_id);
        let mut tile = new_tile(schema, attribute_id, tile_idx);

        let mut packed = vec![0u8; entry.size as usize];
        vfs.read_from_file(&attribute_file(&self.uri, name), entry.offset, &mut packed)?;
        let fixed = entry.compressor.decompress(&packed, entry.raw_size as usize)?;

        if tile.var_size() {
            let offsets: Vec<u64> = decode_values(&fixed);
            let mut packed_values = vec![0u8; entry.var_size as usize];
            vfs.read_from_file(&var_file(&self.uri, name), entry.var_offset, &mut packed_values)?;
            let values = entry
                .compressor
                .decompress(&packed_values, entry.var_raw_size as usize)?;
            tile.set_var_payload(offsets, &values)?;
        } else {
            tile.set_payload(&fixed)?;
            if tile.tile_type() == TileType::Coordinate {
                if let Some(mbr) = self.metadata.mbrs().get(tile_idx as usize) {
                    tile.set_mbr(mbr);
                }
            }
        }

        if tile.cell_num() != entry.cell_num {
            return Err(MosaicError::Corruption(format!(
                "Tile {} of '{}' holds {} cells, metadata says {}",
                tile_idx,
                name,
                tile.cell_num(),
                entry.cell_num
            )));
        }
        Ok(tile)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn metadata(&self) -> &FragmentMetadata {
        &self.metadata
    }

    pub fn dense(&self) -> bool {
        self.metadata.dense()
    }

    /// True while the fragment accepts writes
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for Fragment {
    fn drop(&mut self) {
        self.discard();
    }
}

impl FragmentWriter {
    /// Write the pending tiles of every stored attribute
    fn flush(
        &mut self,
        vfs: &dyn Vfs,
        schema: &ArraySchema,
        metadata: &mut FragmentMetadata,
    ) -> Result<()> {
        if self.cells_in_tile == 0 {
            return Ok(());
        }
        let tile_idx = metadata.tile_num() as u64;

        for (slot, &id) in self.stored.iter().enumerate() {
            let name = schema.attribute_name(id);
            let tile = &self.tiles[slot];
            let (fixed_size, var_size) = self.file_sizes[slot];
            let (compressor, level) = schema.compression(id);
            let mut entry = TileEntry {
                offset: fixed_size,
                var_offset: var_size,
                cell_num: tile.cell_num(),
                compressor,
                ..Default::default()
            };

            if tile.var_size() {
                let offsets = encode_values(tile.offsets());
                let packed_offsets = compressor.compress(level, &offsets)?;
                let packed_values = compressor.compress(level, tile.payload())?;
                vfs.write_to_file(&attribute_file(&self.temp_uri, name), &packed_offsets)?;
                vfs.write_to_file(&var_file(&self.temp_uri, name), &packed_values)?;
                entry.size = packed_offsets.len() as u64;
                entry.raw_size = offsets.len() as u64;
                entry.var_size = packed_values.len() as u64;
                entry.var_raw_size = tile.tile_size() as u64;
            } else {
                let packed = compressor.compress(level, tile.payload())?;
                vfs.write_to_file(&attribute_file(&self.temp_uri, name), &packed)?;
                entry.size = packed.len() as u64;
                entry.raw_size = tile.tile_size() as u64;
            }
            self.file_sizes[slot] = (fixed_size + entry.size, var_size + entry.var_size);

            if tile.tile_type() == TileType::Coordinate {
                if let (Some(mbr), Some((first, last))) = (tile.mbr(), tile.bounding_coordinates()) {
                    metadata.push_coords_summary(mbr.to_vec(), (first.to_vec(), last.to_vec()));
                }
            }
            metadata.push_tile(id, entry);
        }

        debug!(
            fragment = %metadata.name(),
            tile = tile_idx,
            cells = self.cells_in_tile,
            "Flushed tile"
        );

        self.tiles = self
            .stored
            .iter()
            .map(|&id| new_tile(schema, id, tile_idx + 1))
            .collect();
        self.cells_in_tile = 0;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn new_tile(schema: &ArraySchema, attribute_id: usize, tile_id: u64) -> Tile {
    if attribute_id == schema.coords_id() {
        Tile::coordinate(tile_id, schema.coords_type(), schema.dim_num())
    } else {
        Tile::attribute(
            tile_id,
            schema.datatype(attribute_id),
            schema.cell_val_num(attribute_id),
        )
    }
}

fn attribute_file(fragment_uri: &str, name: &str) -> String {
    vfs::join(fragment_uri, &format!("{}{}", name, FILE_SUFFIX))
}

fn var_file(fragment_uri: &str, name: &str) -> String {
    vfs::join(fragment_uri, &format!("{}{}{}", name, VAR_FILE_SUFFIX, FILE_SUFFIX))
}

/// Cells per space tile of a dense subarray, in global order
fn dense_tile_sizes(schema: &ArraySchema, subarray: &[u8]) -> Result<Vec<u64>> {
    let grid = schema.dense_grid()?;
    let (lo, hi) = grid.bounds(subarray);
    grid.tile_sizes(&lo, &hi)
}

fn remove_dir(vfs: &dyn Vfs, uri: &str) {
    if vfs.is_dir(uri) {
        if let Err(e) = vfs.delete_dir(uri) {
            warn!(uri = %uri, error = %e, "Failed to remove fragment directory");
        }
    }
}
