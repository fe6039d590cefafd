//! Tile Module
//!
//! In-memory container for one tile's worth of cells of a single attribute,
//! or of the coordinates.
//!
//! ## Payload Layout
//! ```text
//! Fixed-size cells (attribute or coordinates):
//! ┌──────────┬──────────┬─────┬──────────┐
//! │ cell 0   │ cell 1   │ ... │ cell n-1 │   cell_num * cell_size == tile_size
//! └──────────┴──────────┴─────┴──────────┘
//!
//! Variable-size cells:
//! offsets: [0, o1, o2, ..., o(n-1)]           strictly increasing
//! payload: ┌────────┬──────────┬─────┬───────────────┐
//!          │ cell 0 │ cell 1   │ ... │ cell n-1      │
//!          └────────┴──────────┴─────┴───────────────┘
//!          cell i spans offsets[i]..offsets[i+1] (or payload end)
//! ```
//!
//! Coordinate tiles store tuples cell-interleaved (`x0 y0 x1 y1 ...`) and
//! keep a minimum bounding rectangle (`[lo, hi]` per dimension) that grows
//! as coordinates are appended.

mod compression;
mod iter;

use bytes::BytesMut;

use crate::constants::VAR_NUM;
use crate::datatype::{del_value, dispatch_datatype, empty_value, CellValue, Datatype};
use crate::error::{MosaicError, Result};

pub use compression::{Compressor, DEFAULT_COMPRESSION_LEVEL};
pub use iter::{CellIter, CellView, ReverseCellIter};

/// What a tile holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Attribute,
    Coordinate,
}

/// One tile of cells
#[derive(Debug, Clone)]
pub struct Tile {
    tile_id: u64,
    tile_type: TileType,
    cell_type: Datatype,
    type_size: usize,
    /// Values per cell; `VAR_NUM` for variable-sized attribute cells
    cell_val_num: u32,
    /// 0 for attribute tiles
    dim_num: usize,
    payload: BytesMut,
    /// Start of every cell in `payload` (variable-sized tiles only)
    offsets: Vec<u64>,
    /// Coordinate tiles only
    mbr: Option<Vec<u8>>,
    /// First and last appended coordinates
    bounding: Option<(Vec<u8>, Vec<u8>)>,
    cell_num: u64,
}

impl Tile {
    /// Create an empty attribute tile
    pub fn attribute(tile_id: u64, cell_type: Datatype, cell_val_num: u32) -> Self {
        Self {
            tile_id,
            tile_type: TileType::Attribute,
            cell_type,
            type_size: cell_type.size(),
            cell_val_num,
            dim_num: 0,
            payload: BytesMut::new(),
            offsets: Vec::new(),
            mbr: None,
            bounding: None,
            cell_num: 0,
        }
    }

    /// Create an empty coordinate tile over `dim_num` dimensions
    pub fn coordinate(tile_id: u64, coords_type: Datatype, dim_num: usize) -> Self {
        Self {
            tile_id,
            tile_type: TileType::Coordinate,
            cell_type: coords_type,
            type_size: coords_type.size(),
            cell_val_num: dim_num as u32,
            dim_num,
            payload: BytesMut::new(),
            offsets: Vec::new(),
            mbr: None,
            bounding: None,
            cell_num: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn tile_id(&self) -> u64 {
        self.tile_id
    }

    pub fn tile_type(&self) -> TileType {
        self.tile_type
    }

    pub fn cell_type(&self) -> Datatype {
        self.cell_type
    }

    pub fn type_size(&self) -> usize {
        self.type_size
    }

    pub fn cell_val_num(&self) -> u32 {
        self.cell_val_num
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn cell_num(&self) -> u64 {
        self.cell_num
    }

    pub fn is_empty(&self) -> bool {
        self.cell_num == 0
    }

    pub fn var_size(&self) -> bool {
        self.cell_val_num == VAR_NUM
    }

    /// Fixed cell size in bytes, `None` for variable-sized tiles
    pub fn cell_size(&self) -> Option<usize> {
        if self.var_size() {
            None
        } else {
            Some(self.cell_val_num as usize * self.type_size)
        }
    }

    /// Payload size in bytes
    pub fn tile_size(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cell start offsets (variable-sized tiles)
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Minimum bounding rectangle, `[lo, hi]` per dimension
    pub fn mbr(&self) -> Option<&[u8]> {
        self.mbr.as_deref()
    }

    /// First and last coordinates in append order
    pub fn bounding_coordinates(&self) -> Option<(&[u8], &[u8])> {
        self.bounding
            .as_ref()
            .map(|(first, last)| (first.as_slice(), last.as_slice()))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Append one fixed-size cell
    pub fn append_cell(&mut self, cell: &[u8]) -> Result<()> {
        let cell_size = self.cell_size().ok_or_else(|| {
            MosaicError::Query("Fixed-size append on a variable-sized tile".to_string())
        })?;
        if cell.len() != cell_size {
            return Err(MosaicError::Corruption(format!(
                "Cell of {} bytes does not fit tile cells of {} bytes",
                cell.len(),
                cell_size
            )));
        }

        if self.tile_type == TileType::Coordinate {
            self.expand_mbr(cell);
            match &mut self.bounding {
                Some((_, last)) => last.copy_from_slice(cell),
                None => self.bounding = Some((cell.to_vec(), cell.to_vec())),
            }
        }
        self.payload.extend_from_slice(cell);
        self.cell_num += 1;
        Ok(())
    }

    /// Append one variable-sized cell (must hold at least one value)
    pub fn append_var_cell(&mut self, cell: &[u8]) -> Result<()> {
        if !self.var_size() {
            return Err(MosaicError::Query(
                "Variable-sized append on a fixed-size tile".to_string(),
            ));
        }
        if cell.is_empty() || cell.len() % self.type_size != 0 {
            return Err(MosaicError::Corruption(format!(
                "Variable cell of {} bytes is not a positive multiple of {}",
                cell.len(),
                self.type_size
            )));
        }
        self.offsets.push(self.payload.len() as u64);
        self.payload.extend_from_slice(cell);
        self.cell_num += 1;
        Ok(())
    }

    /// Replace the payload of a fixed-size tile
    ///
    /// Recomputes the cell count and, for coordinate tiles, the MBR and the
    /// bounding coordinates by scanning every tuple.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        let cell_size = self.cell_size().ok_or_else(|| {
            MosaicError::Query("Use set_var_payload on variable-sized tiles".to_string())
        })?;
        if payload.len() % cell_size != 0 {
            return Err(MosaicError::Corruption(format!(
                "Tile payload of {} bytes is not a multiple of the cell size {}",
                payload.len(),
                cell_size
            )));
        }

        self.payload = BytesMut::from(payload);
        self.cell_num = (payload.len() / cell_size) as u64;
        self.mbr = None;
        self.bounding = None;

        if self.tile_type == TileType::Coordinate && self.cell_num > 0 {
            let mut mbr: Option<Vec<u8>> = None;
            for tuple in payload.chunks_exact(cell_size) {
                mbr = Some(match mbr {
                    None => point_rect(self.cell_type, tuple),
                    Some(mut rect) => {
                        grow_rect(self.cell_type, &mut rect, tuple);
                        rect
                    }
                });
            }
            self.mbr = mbr;
            self.bounding = Some((
                payload[..cell_size].to_vec(),
                payload[payload.len() - cell_size..].to_vec(),
            ));
        }
        Ok(())
    }

    /// Replace the payload of a variable-sized tile
    pub fn set_var_payload(&mut self, offsets: Vec<u64>, payload: &[u8]) -> Result<()> {
        if !self.var_size() {
            return Err(MosaicError::Query(
                "Use set_payload on fixed-size tiles".to_string(),
            ));
        }
        if let Some(&first) = offsets.first() {
            if first != 0 {
                return Err(MosaicError::Corruption(format!(
                    "First variable cell offset is {}, expected 0",
                    first
                )));
            }
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MosaicError::Corruption(
                "Variable cell offsets are not strictly increasing".to_string(),
            ));
        }
        if let Some(&last) = offsets.last() {
            if last >= payload.len() as u64 {
                return Err(MosaicError::Corruption(format!(
                    "Variable cell offset {} exceeds payload of {} bytes",
                    last,
                    payload.len()
                )));
            }
        } else if !payload.is_empty() {
            return Err(MosaicError::Corruption(
                "Variable payload without offsets".to_string(),
            ));
        }

        self.cell_num = offsets.len() as u64;
        self.offsets = offsets;
        self.payload = BytesMut::from(payload);
        Ok(())
    }

    /// Overwrite the MBR (used when a tile is loaded with stored metadata)
    pub fn set_mbr(&mut self, mbr: &[u8]) {
        debug_assert_eq!(mbr.len(), 2 * self.dim_num * self.type_size);
        self.mbr = Some(mbr.to_vec());
    }

    /// Drop all cells, keeping the tile identity
    pub fn clear(&mut self) {
        self.payload.clear();
        self.offsets.clear();
        self.mbr = None;
        self.bounding = None;
        self.cell_num = 0;
    }

    /// Append the raw payload to `out`
    pub fn copy_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.payload);
    }

    fn expand_mbr(&mut self, tuple: &[u8]) {
        match &mut self.mbr {
            Some(rect) => grow_rect(self.cell_type, rect, tuple),
            None => self.mbr = Some(point_rect(self.cell_type, tuple)),
        }
    }

    // =========================================================================
    // Cell Access
    // =========================================================================

    /// Size of the cell at `pos`
    pub fn cell_size_at(&self, pos: u64) -> Option<usize> {
        if pos >= self.cell_num {
            return None;
        }
        match self.cell_size() {
            Some(size) => Some(size),
            None => {
                let start = self.offsets[pos as usize];
                let end = self
                    .offsets
                    .get(pos as usize + 1)
                    .copied()
                    .unwrap_or(self.payload.len() as u64);
                debug_assert!(end > start, "variable offsets must be strictly increasing");
                Some((end - start) as usize)
            }
        }
    }

    /// Raw bytes of the cell at `pos`
    pub fn cell(&self, pos: u64) -> Option<&[u8]> {
        let size = self.cell_size_at(pos)?;
        let start = match self.cell_size() {
            Some(fixed) => pos as usize * fixed,
            None => self.offsets[pos as usize] as usize,
        };
        Some(&self.payload[start..start + size])
    }

    /// True if the coordinate tuple at `pos` lies in `range` (`[lo, hi]` per dimension)
    ///
    /// `T` must be the tile's cell type. This is only checked in debug builds.
    pub fn cell_inside_range<T: CellValue>(&self, pos: u64, range: &[T]) -> bool {
        debug_assert_eq!(T::DATATYPE.size(), self.cell_type.size());
        debug_assert_eq!(self.tile_type, TileType::Coordinate);
        debug_assert!(range.len() >= 2 * self.dim_num);

        let start = pos as usize * self.dim_num * T::SIZE;
        (0..self.dim_num).all(|d| {
            let c = T::read_le(&self.payload[start + d * T::SIZE..]);
            c >= range[2 * d] && c <= range[2 * d + 1]
        })
    }

    /// True if the cell at `pos` holds the deletion sentinel
    pub fn is_del(&self, pos: u64) -> bool {
        match self.cell(pos) {
            Some(cell) => is_sentinel(cell, &del_value(self.cell_type)),
            None => false,
        }
    }

    /// True if the cell at `pos` holds the empty (null) sentinel
    pub fn is_null(&self, pos: u64) -> bool {
        match self.cell(pos) {
            Some(cell) => is_sentinel(cell, &empty_value(self.cell_type)),
            None => false,
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Forward iterator over every cell
    ///
    /// The iterator borrows the tile, so the tile cannot be mutated
    /// (`set_payload`, `clear`, appends) while it is alive.
    pub fn iter(&self) -> CellIter<'_> {
        CellIter::new(self, 0)
    }

    /// Forward iterator starting at `pos`
    pub fn iter_from(&self, pos: u64) -> CellIter<'_> {
        CellIter::new(self, pos)
    }

    /// Reverse iterator starting at the last cell
    pub fn rev_iter(&self) -> ReverseCellIter<'_> {
        ReverseCellIter::new(self, self.cell_num.checked_sub(1))
    }

    /// Reverse iterator starting at `pos` (inclusive)
    pub fn rev_iter_from(&self, pos: u64) -> ReverseCellIter<'_> {
        let start = if pos < self.cell_num { Some(pos) } else { None };
        ReverseCellIter::new(self, start)
    }
}

/// A cell matches a sentinel when its first value equals it
pub(crate) fn is_sentinel(cell: &[u8], sentinel: &[u8]) -> bool {
    cell.len() >= sentinel.len() && &cell[..sentinel.len()] == sentinel
}

/// Degenerate rectangle `[c, c]` around a tuple
fn point_rect(datatype: Datatype, tuple: &[u8]) -> Vec<u8> {
    let size = datatype.size();
    let mut rect = Vec::with_capacity(2 * tuple.len());
    for value in tuple.chunks_exact(size) {
        rect.extend_from_slice(value);
        rect.extend_from_slice(value);
    }
    rect
}

/// Grow `rect` to cover `tuple`
fn grow_rect(datatype: Datatype, rect: &mut [u8], tuple: &[u8]) {
    dispatch_datatype!(datatype, T => {
        for (d, chunk) in tuple.chunks_exact(T::SIZE).enumerate() {
            let value = T::read_le(chunk);
            let lo_at = 2 * d * T::SIZE;
            let hi_at = lo_at + T::SIZE;
            if value < T::read_le(&rect[lo_at..]) {
                rect[lo_at..hi_at].copy_from_slice(chunk);
            }
            if value > T::read_le(&rect[hi_at..]) {
                rect[hi_at..hi_at + T::SIZE].copy_from_slice(chunk);
            }
        }
    })
}
