//! Row- and column-major sparse reads
//!
//! The subarray is cut into slabs along the slowest dimension of the
//! requested layout (the first for row-major, the last for column-major).
//! Each slab is merged in global order, sorted into the layout and served
//! before the next slab is touched, so at most one slab is held in memory.
//!
//! ```text
//!   dim 0 ──►
//!   b0        b1        b2             b3
//!   ├─ slab ──┼─ slab ──┼──── slab ────┤
//!   [b0, b1)  [b1, b2)  [b2, b3]
//! ```
//!
//! Slab boundaries are the MBR bounds of the overlapping tiles, clipped to
//! the subarray. Adjacent slabs are coalesced while their estimated cell
//! count stays within the configured budget.

use std::cmp::Ordering;

use crate::datatype::cmp_value;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::schema::{ArraySchema, Layout};

use super::read_state::{Region, ResultCell, SparseMerge};

/// Extent of one tile along the slab dimension
#[derive(Debug)]
struct TileSpan {
    lo: Vec<u8>,
    hi: Vec<u8>,
    cell_num: u64,
}

/// Sorted stream over a sparse subarray, for READ_SORTED_ROW and
/// READ_SORTED_COL
#[derive(Debug)]
pub(crate) struct SortedSlabStream {
    layout: Layout,
    dim: usize,
    subarray: Vec<u8>,
    /// Sorted, distinct slab boundaries
    breakpoints: Vec<Vec<u8>>,
    next_break: usize,
    spans: Vec<TileSpan>,
    slab_cells: u64,
    slab: std::vec::IntoIter<ResultCell>,
    finished: bool,
}

impl SortedSlabStream {
    pub fn new(
        schema: &ArraySchema,
        fragments: &[Fragment],
        subarray: &[u8],
        layout: Layout,
        slab_cells: u64,
    ) -> Self {
        debug_assert!(matches!(layout, Layout::RowMajor | Layout::ColMajor));
        let dim = match layout {
            Layout::ColMajor => schema.dim_num() - 1,
            _ => 0,
        };
        let datatype = schema.coords_type();
        let size = datatype.size();
        let coords_id = schema.coords_id();
        let value = |rect: &[u8], bound: usize| rect[(2 * dim + bound) * size..][..size].to_vec();

        let mut spans = Vec::new();
        for fragment in fragments.iter().filter(|f| !f.dense()) {
            let metadata = fragment.metadata();
            if !schema.rects_overlap(metadata.non_empty_domain(), subarray) {
                continue;
            }
            for (t, mbr) in metadata.mbrs().iter().enumerate() {
                if !schema.rects_overlap(mbr, subarray) {
                    continue;
                }
                let (mbr_lo, sub_lo) = (value(mbr, 0), value(subarray, 0));
                let (mbr_hi, sub_hi) = (value(mbr, 1), value(subarray, 1));
                let lo = if cmp_value(datatype, &mbr_lo, &sub_lo) == Ordering::Less {
                    sub_lo
                } else {
                    mbr_lo
                };
                let hi = if cmp_value(datatype, &mbr_hi, &sub_hi) == Ordering::Greater {
                    sub_hi
                } else {
                    mbr_hi
                };
                let cell_num = metadata
                    .tiles(coords_id)
                    .get(t)
                    .map(|e| e.cell_num)
                    .unwrap_or(0);
                spans.push(TileSpan { lo, hi, cell_num });
            }
        }

        let mut breakpoints: Vec<Vec<u8>> = spans
            .iter()
            .flat_map(|s| [s.lo.clone(), s.hi.clone()])
            .collect();
        breakpoints.sort_by(|a, b| cmp_value(datatype, a, b));
        breakpoints.dedup_by(|a, b| cmp_value(datatype, a, b) == Ordering::Equal);

        Self {
            layout,
            dim,
            subarray: subarray.to_vec(),
            breakpoints,
            next_break: 0,
            spans,
            slab_cells,
            slab: Vec::new().into_iter(),
            finished: false,
        }
    }

    pub fn next_cell(
        &mut self,
        schema: &ArraySchema,
        fragments: &mut [Fragment],
    ) -> Result<Option<ResultCell>> {
        loop {
            if let Some(cell) = self.slab.next() {
                return Ok(Some(cell));
            }
            if !self.load_slab(schema, fragments)? {
                return Ok(None);
            }
        }
    }

    /// Merge and sort the next slab; false once the subarray is exhausted
    fn load_slab(&mut self, schema: &ArraySchema, fragments: &mut [Fragment]) -> Result<bool> {
        if self.finished || self.breakpoints.is_empty() {
            return Ok(false);
        }
        let last = self.breakpoints.len() - 1;
        let start = self.next_break;
        let mut end = (start + 1).min(last);
        while end < last && self.estimate(schema, start, end + 1) <= self.slab_cells {
            end += 1;
        }
        let closed = end == last;

        let size = schema.coords_type().size();
        let mut rect = self.subarray.clone();
        rect[2 * self.dim * size..][..size].copy_from_slice(&self.breakpoints[start]);
        rect[(2 * self.dim + 1) * size..][..size].copy_from_slice(&self.breakpoints[end]);
        let region = if closed {
            Region::closed(rect)
        } else {
            Region::half_open(rect, self.dim)
        };

        let mut merge = SparseMerge::new(schema, fragments, region);
        let mut cells = Vec::new();
        while let Some(cell) = merge.next_cell(schema, fragments)? {
            cells.push(cell);
        }
        let layout = self.layout;
        cells.sort_by(|a, b| schema.cmp_cell_order(&a.coords, &b.coords, layout));

        tracing::debug!(
            slab_start = start,
            slab_end = end,
            cells = cells.len(),
            "Loaded sorted slab"
        );
        self.slab = cells.into_iter();
        self.next_break = end;
        self.finished = closed;
        Ok(true)
    }

    /// Cells of the tiles overlapping `[breakpoints[start], breakpoints[end]]`
    fn estimate(&self, schema: &ArraySchema, start: usize, end: usize) -> u64 {
        let datatype = schema.coords_type();
        let (lo, hi) = (&self.breakpoints[start], &self.breakpoints[end]);
        self.spans
            .iter()
            .filter(|s| {
                cmp_value(datatype, &s.lo, hi) != Ordering::Greater
                    && cmp_value(datatype, &s.hi, lo) != Ordering::Less
            })
            .map(|s| s.cell_num)
            .sum()
    }
}
