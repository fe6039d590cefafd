//! Streaming read state
//!
//! Produces the cells of a read one at a time and copies them into the
//! caller's buffers. A cell that does not fit is held back and handed out
//! first on the next submission, so overflow never loses or repeats a cell.
//!
//! ## Streams
//! ```text
//! ┌──────────────┬────────────────┬───────────────────────────────────────┐
//! │ Array        │ Layout         │ Stream                                │
//! ├──────────────┼────────────────┼───────────────────────────────────────┤
//! │ dense        │ any            │ DenseStream: walk the subarray in the │
//! │              │                │ layout, locate cells arithmetically   │
//! │ sparse       │ global order   │ SparseMerge: k-way merge of fragment  │
//! │              │                │ cursors, tile by tile                 │
//! │ sparse       │ row / column   │ SortedSlabStream: merge one slab of   │
//! │              │                │ the subarray at a time, then sort it  │
//! └──────────────┴────────────────┴───────────────────────────────────────┘
//! ```
//!
//! ## Merge rules
//! - Fragments are held oldest first; for identical coordinates the newest
//!   fragment wins, and within a fragment the latest occurrence wins.
//! - Sparse arrays only yield cells that were written.
//! - Dense arrays yield every cell of the subarray; cells no fragment covers
//!   carry the empty sentinel.

use std::cmp::Ordering;

use crate::datatype::{cmp_value, empty_value};
use crate::error::{MosaicError, Result};
use crate::fragment::Fragment;
use crate::schema::{ArraySchema, CellWalk, DenseGrid, Layout};

use super::sorted_read_state::SortedSlabStream;
use super::QueryBuffer;

/// Where the attribute values of a result cell live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellSource {
    Fragment { fragment: usize, tile: u64, pos: u64 },
    /// Dense cell no fragment wrote
    Empty,
}

/// One cell of the result stream
#[derive(Debug, Clone)]
pub(crate) struct ResultCell {
    pub coords: Vec<u8>,
    pub source: CellSource,
}

/// Read state shared by every read mode
#[derive(Debug)]
pub(crate) struct ArrayReadState {
    layout: Layout,
    /// Cell budget of one sorted slab
    slab_cells: u64,
    /// Opened on the first submission
    stream: Option<CellStream>,
    /// Cell that did not fit during the last submission
    pending: Option<ResultCell>,
    done: bool,
}

impl ArrayReadState {
    pub fn new(layout: Layout, slab_cells: u64) -> Self {
        Self {
            layout,
            slab_cells: slab_cells.max(1),
            stream: None,
            pending: None,
            done: false,
        }
    }

    /// Read the next batch of cells into `buffers`
    pub fn read(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
        subarray: &[u8],
        attribute_ids: &[usize],
        buffers: &mut [QueryBuffer],
        overflow: &mut [bool],
    ) -> Result<()> {
        if self.stream.is_none() && !self.done {
            let stream =
                CellStream::new(schema, fragments, subarray, self.layout, self.slab_cells)?;
            tracing::debug!(
                fragments = fragments.len(),
                layout = ?self.layout,
                "Opened read stream"
            );
            self.stream = Some(stream);
        }
        self.copy_cells(schema, fragments, attribute_ids, buffers, overflow)
    }

    /// True once every cell was handed out
    pub fn done(&self) -> bool {
        self.done
    }

    /// Copy cells until the stream ends or a buffer is full
    ///
    /// A cell is copied for all attributes or for none. Every attribute whose
    /// buffer cannot take the next cell is flagged in `overflow`.
    fn copy_cells(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
        attribute_ids: &[usize],
        buffers: &mut [QueryBuffer],
        overflow: &mut [bool],
    ) -> Result<()> {
        for buffer in buffers.iter_mut() {
            buffer.clear();
        }
        for flag in overflow.iter_mut() {
            *flag = false;
        }
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(()),
        };

        let mut scratch: Vec<Vec<u8>> = vec![Vec::new(); attribute_ids.len()];
        let mut exhausted = false;
        loop {
            let cell = match self.pending.take() {
                Some(cell) => cell,
                None => match stream.next_cell(schema, fragments)? {
                    Some(cell) => cell,
                    None => {
                        exhausted = true;
                        break;
                    }
                },
            };

            for (slot, &id) in attribute_ids.iter().enumerate() {
                scratch[slot].clear();
                gather(schema, fragments, &cell, id, &mut scratch[slot])?;
            }

            let mut fits = true;
            for (slot, bytes) in scratch.iter().enumerate() {
                if !buffers[slot].has_room(bytes.len()) {
                    overflow[slot] = true;
                    fits = false;
                }
            }
            if !fits {
                self.pending = Some(cell);
                break;
            }

            for (slot, bytes) in scratch.iter().enumerate() {
                buffers[slot].push_cell(bytes);
            }
        }

        if exhausted {
            self.stream = None;
            self.done = true;
        }
        Ok(())
    }
}

/// Bytes of one attribute (or the coordinates) of a result cell
fn gather(
    schema: &ArraySchema,
    fragments: &mut [Fragment],
    cell: &ResultCell,
    attribute_id: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    if attribute_id == schema.coords_id() {
        out.extend_from_slice(&cell.coords);
        return Ok(());
    }

    match cell.source {
        CellSource::Fragment {
            fragment,
            tile,
            pos,
        } => {
            let tile = fragments[fragment].tile(attribute_id, tile)?;
            let bytes = tile.cell(pos).ok_or_else(|| {
                MosaicError::Corruption(format!(
                    "Tile {} of '{}' has no cell {}",
                    tile.tile_id(),
                    schema.attribute_name(attribute_id),
                    pos
                ))
            })?;
            out.extend_from_slice(bytes);
        }
        CellSource::Empty => {
            let empty = empty_value(schema.datatype(attribute_id));
            let values = if schema.var_size(attribute_id) {
                1
            } else {
                schema.cell_val_num(attribute_id) as usize
            };
            for _ in 0..values {
                out.extend_from_slice(&empty);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Streams
// =============================================================================

#[derive(Debug)]
enum CellStream {
    Dense(DenseStream),
    Sparse(SparseMerge),
    SparseSorted(SortedSlabStream),
}

impl CellStream {
    fn new(
        schema: &ArraySchema,
        fragments: &[Fragment],
        subarray: &[u8],
        layout: Layout,
        slab_cells: u64,
    ) -> Result<Self> {
        if schema.dense() {
            return Ok(CellStream::Dense(DenseStream::new(
                schema, fragments, subarray, layout,
            )?));
        }
        Ok(match layout {
            Layout::RowMajor | Layout::ColMajor => CellStream::SparseSorted(
                SortedSlabStream::new(schema, fragments, subarray, layout, slab_cells),
            ),
            Layout::GlobalOrder | Layout::Unordered => CellStream::Sparse(SparseMerge::new(
                schema,
                fragments,
                Region::closed(subarray.to_vec()),
            )),
        })
    }

    fn next_cell(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
    ) -> Result<Option<ResultCell>> {
        match self {
            CellStream::Dense(stream) => stream.next_cell(schema, fragments),
            CellStream::Sparse(merge) => merge.next_cell(schema, fragments),
            CellStream::SparseSorted(stream) => stream.next_cell(schema, fragments),
        }
    }
}

/// Cells a merge may yield: a rectangle, optionally open at the upper bound
/// of one dimension
#[derive(Debug, Clone)]
pub(crate) struct Region {
    rect: Vec<u8>,
    open_dim: Option<usize>,
}

impl Region {
    pub fn closed(rect: Vec<u8>) -> Self {
        Self {
            rect,
            open_dim: None,
        }
    }

    /// `rect` without its upper bound along `dim`
    pub fn half_open(rect: Vec<u8>, dim: usize) -> Self {
        Self {
            rect,
            open_dim: Some(dim),
        }
    }

    fn contains(&self, schema: &ArraySchema, coords: &[u8]) -> bool {
        if !schema.coords_in_rect(coords, &self.rect) {
            return false;
        }
        match self.open_dim {
            Some(d) => {
                let datatype = schema.coords_type();
                let size = datatype.size();
                let value = &coords[d * size..(d + 1) * size];
                let upper = &self.rect[(2 * d + 1) * size..(2 * d + 2) * size];
                cmp_value(datatype, value, upper) == Ordering::Less
            }
            None => true,
        }
    }
}

// =============================================================================
// Sparse Merge
// =============================================================================

/// Next cell of one sparse fragment inside the region
#[derive(Debug)]
struct Head {
    coords: Vec<u8>,
    tile: u64,
    pos: u64,
}

/// Position of one sparse fragment within a merge
#[derive(Debug)]
struct SparseCursor {
    fragment: usize,
    /// Tiles whose MBR overlaps the region, in storage order
    tiles: Vec<u64>,
    next_tile: usize,
    next_pos: u64,
    head: Option<Head>,
}

impl SparseCursor {
    fn new(
        schema: &ArraySchema,
        fragment_idx: usize,
        fragment: &Fragment,
        region: &Region,
    ) -> Self {
        let tiles = fragment
            .metadata()
            .mbrs()
            .iter()
            .enumerate()
            .filter(|(_, mbr)| schema.rects_overlap(mbr, &region.rect))
            .map(|(t, _)| t as u64)
            .collect();
        Self {
            fragment: fragment_idx,
            tiles,
            next_tile: 0,
            next_pos: 0,
            head: None,
        }
    }

    /// Move `head` to the next cell of the region, loading tiles on demand
    fn advance(
        &mut self,
        schema: &ArraySchema,
        fragment: &mut Fragment,
        region: &Region,
    ) -> Result<()> {
        self.head = None;
        let coords_id = schema.coords_id();
        while let Some(&t) = self.tiles.get(self.next_tile) {
            let tile = fragment.tile(coords_id, t)?;
            for cell in tile.iter_from(self.next_pos) {
                if region.contains(schema, cell.bytes()) {
                    self.next_pos = cell.pos() + 1;
                    self.head = Some(Head {
                        coords: cell.bytes().to_vec(),
                        tile: t,
                        pos: cell.pos(),
                    });
                    return Ok(());
                }
            }
            self.next_tile += 1;
            self.next_pos = 0;
        }
        Ok(())
    }
}

/// K-way merge of sparse fragments in global order
///
/// Every sparse fragment is stored in global order, so only the current head
/// of each fragment is held in memory.
#[derive(Debug)]
pub(crate) struct SparseMerge {
    region: Region,
    /// Oldest fragment first
    cursors: Vec<SparseCursor>,
    started: bool,
}

impl SparseMerge {
    pub fn new(schema: &ArraySchema, fragments: &[Fragment], region: Region) -> Self {
        let cursors = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                !f.dense() && schema.rects_overlap(f.metadata().non_empty_domain(), &region.rect)
            })
            .map(|(i, f)| SparseCursor::new(schema, i, f, &region))
            .collect();
        Self {
            region,
            cursors,
            started: false,
        }
    }

    pub fn next_cell(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
    ) -> Result<Option<ResultCell>> {
        if !self.started {
            for cursor in self.cursors.iter_mut() {
                let f = cursor.fragment;
                cursor.advance(schema, &mut fragments[f], &self.region)?;
            }
            self.started = true;
        }

        // Smallest head in global order
        let mut min: Option<&[u8]> = None;
        for head in self.cursors.iter().filter_map(|c| c.head.as_ref()) {
            let smaller = match min {
                Some(m) => schema.cmp_global(&head.coords, m) == Ordering::Less,
                None => true,
            };
            if smaller {
                min = Some(&head.coords);
            }
        }
        let coords = match min {
            Some(m) => m.to_vec(),
            None => return Ok(None),
        };

        // Consume every copy of the coordinates; the last one seen wins
        let mut source = CellSource::Empty;
        for cursor in self.cursors.iter_mut() {
            let f = cursor.fragment;
            loop {
                source = match &cursor.head {
                    Some(head) if head.coords == coords => CellSource::Fragment {
                        fragment: f,
                        tile: head.tile,
                        pos: head.pos,
                    },
                    _ => break,
                };
                cursor.advance(schema, &mut fragments[f], &self.region)?;
            }
        }
        Ok(Some(ResultCell { coords, source }))
    }
}

// =============================================================================
// Dense Stream
// =============================================================================

/// Fragment that may cover cells of a dense read
#[derive(Debug)]
enum DenseSource {
    /// Dense fragment over `[lo, hi]`
    Dense {
        fragment: usize,
        lo: Vec<i128>,
        hi: Vec<i128>,
    },
    Sparse { fragment: usize },
}

/// Every cell of a dense subarray in the requested layout
#[derive(Debug)]
struct DenseStream {
    grid: DenseGrid,
    walk: CellWalk,
    /// Newest fragment first
    sources: Vec<DenseSource>,
}

impl DenseStream {
    fn new(
        schema: &ArraySchema,
        fragments: &[Fragment],
        subarray: &[u8],
        layout: Layout,
    ) -> Result<Self> {
        let grid = schema.dense_grid()?;
        let (lo, hi) = grid.bounds(subarray);
        let walk = grid.walk(&lo, &hi, layout);

        let mut sources = Vec::new();
        for (f, fragment) in fragments.iter().enumerate().rev() {
            let domain = fragment.metadata().non_empty_domain();
            if domain.is_empty() || !schema.rects_overlap(domain, subarray) {
                continue;
            }
            if fragment.dense() {
                let (lo, hi) = grid.bounds(domain);
                sources.push(DenseSource::Dense {
                    fragment: f,
                    lo,
                    hi,
                });
            } else {
                sources.push(DenseSource::Sparse { fragment: f });
            }
        }

        Ok(Self {
            grid,
            walk,
            sources,
        })
    }

    fn next_cell(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
    ) -> Result<Option<ResultCell>> {
        let cell = match self.walk.next() {
            Some(cell) => cell,
            None => return Ok(None),
        };
        let coords = self.grid.encode(&cell);

        let mut source = CellSource::Empty;
        for candidate in &self.sources {
            match candidate {
                DenseSource::Dense { fragment, lo, hi } => {
                    let inside = (0..cell.len()).all(|d| lo[d] <= cell[d] && cell[d] <= hi[d]);
                    if !inside {
                        continue;
                    }
                    let (tile, pos) = self.grid.position(lo, hi, &cell).ok_or_else(|| {
                        MosaicError::Corruption(format!(
                            "Dense fragment {} is too large to address",
                            fragments[*fragment].metadata().name()
                        ))
                    })?;
                    source = CellSource::Fragment {
                        fragment: *fragment,
                        tile,
                        pos,
                    };
                    break;
                }
                DenseSource::Sparse { fragment } => {
                    let found = find_cell(schema, &mut fragments[*fragment], &coords)?;
                    if let Some((tile, pos)) = found {
                        source = CellSource::Fragment {
                            fragment: *fragment,
                            tile,
                            pos,
                        };
                        break;
                    }
                }
            }
        }
        Ok(Some(ResultCell { coords, source }))
    }
}

/// (tile, position) of the last cell at `coords` in a sparse fragment
///
/// The bounding coordinates pick the one tile that can hold the cell, then
/// the tile is binary searched.
fn find_cell(
    schema: &ArraySchema,
    fragment: &mut Fragment,
    coords: &[u8],
) -> Result<Option<(u64, u64)>> {
    let metadata = fragment.metadata();
    if !schema.coords_in_rect(coords, metadata.non_empty_domain()) {
        return Ok(None);
    }
    let bounds = metadata.bounding_coords();
    let t = bounds
        .partition_point(|(first, _)| schema.cmp_global(first, coords) != Ordering::Greater);
    if t == 0 || schema.cmp_global(&bounds[t - 1].1, coords) == Ordering::Less {
        return Ok(None);
    }
    let t = (t - 1) as u64;

    let tile = fragment.tile(schema.coords_id(), t)?;
    let (mut lo, mut hi) = (0u64, tile.cell_num());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match tile.cell(mid) {
            Some(cell) if schema.cmp_global(cell, coords) != Ordering::Greater => lo = mid + 1,
            _ => hi = mid,
        }
    }
    if lo == 0 {
        return Ok(None);
    }
    match tile.cell(lo - 1) {
        Some(cell) if cell == coords => Ok(Some((t, lo - 1))),
        _ => Ok(None),
    }
}
