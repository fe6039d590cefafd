//! Cell orderings and region geometry
//!
//! Coordinates and rectangles are handled in their encoded form:
//! - a coordinate tuple is `dim_num` values of the coordinates type
//! - a rectangle (subarray, MBR, non-empty domain) is `[lo, hi]` per dimension

use std::cmp::Ordering;

use crate::datatype::{dispatch_datatype, encode_values, CellValue, Datatype};
use crate::error::{MosaicError, Result};

use super::{ArraySchema, Layout};

/// Upper bound on the space tiles a dense fragment may span
const MAX_DENSE_TILES: u64 = 1 << 32;

impl ArraySchema {
    // =========================================================================
    // Comparators
    // =========================================================================

    /// Compare two coordinate tuples in row- or column-major order
    pub fn cmp_cell_order(&self, a: &[u8], b: &[u8], layout: Layout) -> Ordering {
        dispatch_datatype!(self.coords_type, T => cmp_tuple::<T>(a, b, self.dim_num(), layout))
    }

    /// Compare two coordinate tuples in the array's global order
    ///
    /// Space tiles are compared first (in tile order) when every dimension
    /// has a tile extent, then cells within a tile in cell order.
    pub fn cmp_global(&self, a: &[u8], b: &[u8]) -> Ordering {
        dispatch_datatype!(self.coords_type, T => {
            if self.has_tile_extents() {
                let ord = self.cmp_tiles::<T>(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            cmp_tuple::<T>(a, b, self.dim_num(), self.cell_order)
        })
    }

    /// Compare coordinates in the requested query layout
    pub fn cmp_layout(&self, a: &[u8], b: &[u8], layout: Layout) -> Ordering {
        match layout {
            Layout::RowMajor | Layout::ColMajor => self.cmp_cell_order(a, b, layout),
            Layout::GlobalOrder | Layout::Unordered => self.cmp_global(a, b),
        }
    }

    fn cmp_tiles<T: CellValue>(&self, a: &[u8], b: &[u8]) -> Ordering {
        let dim_num = self.dim_num();
        for i in 0..dim_num {
            let d = dim_index(i, dim_num, self.tile_order);
            let ta = self.tile_index_along::<T>(a, d);
            let tb = self.tile_index_along::<T>(b, d);
            if ta != tb {
                return ta.cmp(&tb);
            }
        }
        Ordering::Equal
    }

    fn tile_index_along<T: CellValue>(&self, coords: &[u8], d: usize) -> u64 {
        let dim = &self.dimensions[d];
        match dim.tile_extent() {
            Some(extent) => {
                let lo = T::read_le(dim.domain());
                T::read_le(&coords[d * T::SIZE..]).tile_index(lo, T::read_le(extent))
            }
            None => 0,
        }
    }

    // =========================================================================
    // Rectangles
    // =========================================================================

    /// Check that `subarray` is well formed and lies inside the domain
    pub fn validate_subarray(&self, subarray: &[u8]) -> Result<()> {
        if subarray.len() != 2 * self.coords_size() {
            return Err(MosaicError::Query(format!(
                "Subarray must hold {} bytes, got {}",
                2 * self.coords_size(),
                subarray.len()
            )));
        }
        let domain = self.domain();
        dispatch_datatype!(self.coords_type, T => {
            for d in 0..self.dim_num() {
                let lo = T::read_le(&subarray[2 * d * T::SIZE..]);
                let hi = T::read_le(&subarray[(2 * d + 1) * T::SIZE..]);
                let dom_lo = T::read_le(&domain[2 * d * T::SIZE..]);
                let dom_hi = T::read_le(&domain[(2 * d + 1) * T::SIZE..]);
                if !(lo <= hi) || lo < dom_lo || hi > dom_hi {
                    return Err(MosaicError::Query(format!(
                        "Subarray [{:?}, {:?}] is invalid for dimension '{}'",
                        lo,
                        hi,
                        self.dimensions[d].name()
                    )));
                }
            }
            Ok(())
        })
    }

    /// True if the coordinate tuple lies inside `rect`
    pub fn coords_in_rect(&self, coords: &[u8], rect: &[u8]) -> bool {
        dispatch_datatype!(self.coords_type, T => {
            (0..self.dim_num()).all(|d| {
                let c = T::read_le(&coords[d * T::SIZE..]);
                c >= T::read_le(&rect[2 * d * T::SIZE..])
                    && c <= T::read_le(&rect[(2 * d + 1) * T::SIZE..])
            })
        })
    }

    /// True if two rectangles intersect
    pub fn rects_overlap(&self, a: &[u8], b: &[u8]) -> bool {
        dispatch_datatype!(self.coords_type, T => {
            (0..self.dim_num()).all(|d| {
                let a_lo = T::read_le(&a[2 * d * T::SIZE..]);
                let a_hi = T::read_le(&a[(2 * d + 1) * T::SIZE..]);
                let b_lo = T::read_le(&b[2 * d * T::SIZE..]);
                let b_hi = T::read_le(&b[(2 * d + 1) * T::SIZE..]);
                a_lo <= b_hi && b_lo <= a_hi
            })
        })
    }

    /// Human-readable rectangle, e.g. `[1, 9] x [1, 7]`
    pub fn rect_string(&self, rect: &[u8]) -> String {
        if rect.len() != 2 * self.coords_size() {
            return "empty".to_string();
        }
        dispatch_datatype!(self.coords_type, T => {
            (0..self.dim_num())
                .map(|d| {
                    format!(
                        "[{:?}, {:?}]",
                        T::read_le(&rect[2 * d * T::SIZE..]),
                        T::read_le(&rect[(2 * d + 1) * T::SIZE..])
                    )
                })
                .collect::<Vec<_>>()
                .join(" x ")
        })
    }

    /// Grow `acc` so that it also covers `rect`
    pub(crate) fn union_rect(&self, acc: &mut [u8], rect: &[u8]) {
        dispatch_datatype!(self.coords_type, T => {
            let mut out = Vec::with_capacity(acc.len());
            for d in 0..self.dim_num() {
                let lo_a = T::read_le(&acc[2 * d * T::SIZE..]);
                let hi_a = T::read_le(&acc[(2 * d + 1) * T::SIZE..]);
                let lo_b = T::read_le(&rect[2 * d * T::SIZE..]);
                let hi_b = T::read_le(&rect[(2 * d + 1) * T::SIZE..]);
                (if lo_b < lo_a { lo_b } else { lo_a }).write_le(&mut out);
                (if hi_b > hi_a { hi_b } else { hi_a }).write_le(&mut out);
            }
            acc.copy_from_slice(&out);
        })
    }

    // =========================================================================
    // Dense Enumeration
    // =========================================================================

    /// Number of cells inside a dense rectangle
    ///
    /// Fails with an allocation error when the count does not fit in a u64.
    pub fn cell_num_in_rect(&self, rect: &[u8]) -> Result<u64> {
        let (lo, hi) = self.rect_bounds(rect)?;
        cell_count(&lo, &hi)
    }

    /// Cell geometry used to enumerate and locate dense cells
    pub(crate) fn dense_grid(&self) -> Result<DenseGrid> {
        let (dom_lo, _) = self.rect_bounds(&self.domain())?;
        let extents = if self.has_tile_extents() {
            Some(self.extents_i128()?)
        } else {
            None
        };
        Ok(DenseGrid {
            coords_type: self.coords_type,
            dom_lo,
            extents,
            cell_order: self.cell_order,
            tile_order: self.tile_order,
        })
    }

    fn rect_bounds(&self, rect: &[u8]) -> Result<(Vec<i128>, Vec<i128>)> {
        dispatch_datatype!(self.coords_type, T => {
            let mut lo = Vec::with_capacity(self.dim_num());
            let mut hi = Vec::with_capacity(self.dim_num());
            for d in 0..self.dim_num() {
                let l = T::read_le(&rect[2 * d * T::SIZE..]).to_i64();
                let h = T::read_le(&rect[(2 * d + 1) * T::SIZE..]).to_i64();
                match (l, h) {
                    (Some(l), Some(h)) => {
                        lo.push(l as i128);
                        hi.push(h as i128);
                    }
                    _ => {
                        return Err(MosaicError::Schema(format!(
                            "Cannot enumerate cells over {} coordinates",
                            self.coords_type
                        )))
                    }
                }
            }
            Ok((lo, hi))
        })
    }

    fn extents_i128(&self) -> Result<Vec<i128>> {
        dispatch_datatype!(self.coords_type, T => {
            self.dimensions
                .iter()
                .map(|d| {
                    d.tile_extent()
                        .and_then(|e| T::read_le(e).to_i64())
                        .map(|e| e as i128)
                        .ok_or_else(|| {
                            MosaicError::Schema(format!(
                                "Dimension '{}' has no integer tile extent",
                                d.name()
                            ))
                        })
                })
                .collect()
        })
    }
}

// =============================================================================
// Dense Grid
// =============================================================================

/// Domain origin, tile extents and orders of a dense array
///
/// Coordinates are widened to i128 so that spans over a full i64 domain
/// never overflow.
#[derive(Debug, Clone)]
pub(crate) struct DenseGrid {
    coords_type: Datatype,
    dom_lo: Vec<i128>,
    /// Present only when every dimension has a tile extent
    extents: Option<Vec<i128>>,
    cell_order: Layout,
    tile_order: Layout,
}

impl DenseGrid {
    /// Decode a rectangle into per-dimension `[lo, hi]` bounds
    pub fn bounds(&self, rect: &[u8]) -> (Vec<i128>, Vec<i128>) {
        dispatch_datatype!(self.coords_type, T => {
            let value = |offset: usize| -> i128 {
                T::read_le(&rect[offset * T::SIZE..]).to_i64().unwrap_or(0) as i128
            };
            let dim_num = self.dom_lo.len();
            let lo: Vec<i128> = (0..dim_num).map(|d| value(2 * d)).collect();
            let hi: Vec<i128> = (0..dim_num).map(|d| value(2 * d + 1)).collect();
            (lo, hi)
        })
    }

    /// Encode a cell in the coordinates type
    pub fn encode(&self, cell: &[i128]) -> Vec<u8> {
        dispatch_datatype!(self.coords_type, T => {
            let values: Vec<T> = cell.iter().map(|&c| T::from_i64(c as i64)).collect();
            encode_values(&values)
        })
    }

    /// Lazy walk over every cell of `[lo, hi]` in `layout`
    ///
    /// Global order visits space tiles in tile order, then the cells of each
    /// tile (clipped to the rectangle) in cell order.
    pub fn walk(&self, lo: &[i128], hi: &[i128], layout: Layout) -> CellWalk {
        match (layout, &self.extents) {
            (Layout::GlobalOrder | Layout::Unordered, Some(extents)) => {
                let (tile_lo, tile_hi) = self.tile_range(lo, hi, extents);
                CellWalk {
                    lo: lo.to_vec(),
                    hi: hi.to_vec(),
                    tiles: Some(TileWalk {
                        tiles: Odometer::new(tile_lo, tile_hi, self.tile_order),
                        dom_lo: self.dom_lo.clone(),
                        extents: extents.clone(),
                    }),
                    cell_order: self.cell_order,
                    cells: Odometer::exhausted(),
                }
            }
            (Layout::GlobalOrder | Layout::Unordered, None) => {
                CellWalk::flat(lo, hi, self.cell_order)
            }
            (_, _) => CellWalk::flat(lo, hi, layout),
        }
    }

    /// (tile, position) of `cell` inside a dense fragment covering `[lo, hi]`
    ///
    /// Fragments store their rectangle in global order, one tile per space
    /// tile it intersects. `None` if a rank does not fit in a u64.
    pub fn position(&self, lo: &[i128], hi: &[i128], cell: &[i128]) -> Option<(u64, u64)> {
        let extents = match &self.extents {
            Some(extents) => extents,
            None => return Some((0, rank(cell, lo, hi, self.cell_order)?)),
        };
        let (tile_lo, tile_hi) = self.tile_range(lo, hi, extents);
        let tile: Vec<i128> = (0..cell.len())
            .map(|d| (cell[d] - self.dom_lo[d]) / extents[d])
            .collect();
        let (cell_lo, cell_hi) = self.clip_to_tile(lo, hi, &tile, extents);
        Some((
            rank(&tile, &tile_lo, &tile_hi, self.tile_order)?,
            rank(cell, &cell_lo, &cell_hi, self.cell_order)?,
        ))
    }

    /// Cells per space tile of `[lo, hi]`, in global order
    pub fn tile_sizes(&self, lo: &[i128], hi: &[i128]) -> Result<Vec<u64>> {
        let total = cell_count(lo, hi)?;
        let extents = match &self.extents {
            Some(extents) => extents,
            None => return Ok(vec![total]),
        };

        let (tile_lo, tile_hi) = self.tile_range(lo, hi, extents);
        let tile_num = cell_count(&tile_lo, &tile_hi)?;
        if tile_num > MAX_DENSE_TILES {
            return Err(MosaicError::Allocation(format!(
                "Dense region spans {} space tiles",
                tile_num
            )));
        }

        Odometer::new(tile_lo, tile_hi, self.tile_order)
            .map(|tile| {
                let (cell_lo, cell_hi) = self.clip_to_tile(lo, hi, &tile, extents);
                cell_count(&cell_lo, &cell_hi)
            })
            .collect()
    }

    fn tile_range(&self, lo: &[i128], hi: &[i128], extents: &[i128]) -> (Vec<i128>, Vec<i128>) {
        let tile_lo = (0..lo.len())
            .map(|d| (lo[d] - self.dom_lo[d]) / extents[d])
            .collect();
        let tile_hi = (0..hi.len())
            .map(|d| (hi[d] - self.dom_lo[d]) / extents[d])
            .collect();
        (tile_lo, tile_hi)
    }

    fn clip_to_tile(
        &self,
        lo: &[i128],
        hi: &[i128],
        tile: &[i128],
        extents: &[i128],
    ) -> (Vec<i128>, Vec<i128>) {
        clip_to_tile(lo, hi, tile, &self.dom_lo, extents)
    }
}

/// Cells of `[lo, hi]` inside one space tile
fn clip_to_tile(
    lo: &[i128],
    hi: &[i128],
    tile: &[i128],
    dom_lo: &[i128],
    extents: &[i128],
) -> (Vec<i128>, Vec<i128>) {
    let cell_lo = (0..lo.len())
        .map(|d| lo[d].max(dom_lo[d] + tile[d] * extents[d]))
        .collect();
    let cell_hi = (0..hi.len())
        .map(|d| hi[d].min(dom_lo[d] + (tile[d] + 1) * extents[d] - 1))
        .collect();
    (cell_lo, cell_hi)
}

/// Cells of `[lo, hi]`, or an allocation error past u64
fn cell_count(lo: &[i128], hi: &[i128]) -> Result<u64> {
    let too_many = || MosaicError::Allocation("Dense region holds too many cells".to_string());
    let mut total: u64 = 1;
    for (l, h) in lo.iter().zip(hi) {
        let span = u64::try_from(h - l + 1).map_err(|_| too_many())?;
        total = total.checked_mul(span).ok_or_else(too_many)?;
    }
    Ok(total)
}

/// Index of `cell` in a row- or column-major walk of `[lo, hi]`
fn rank(cell: &[i128], lo: &[i128], hi: &[i128], layout: Layout) -> Option<u64> {
    let dim_num = cell.len();
    let mut r: u128 = 0;
    for i in 0..dim_num {
        let d = dim_index(i, dim_num, layout);
        let span = u128::try_from(hi[d] - lo[d] + 1).ok()?;
        let offset = u128::try_from(cell[d] - lo[d]).ok()?;
        r = r.checked_mul(span)?.checked_add(offset)?;
    }
    u64::try_from(r).ok()
}

/// Lazy dense cell enumeration, see [`DenseGrid::walk`]
#[derive(Debug, Clone)]
pub(crate) struct CellWalk {
    lo: Vec<i128>,
    hi: Vec<i128>,
    /// Present when walking tile by tile
    tiles: Option<TileWalk>,
    cell_order: Layout,
    cells: Odometer,
}

#[derive(Debug, Clone)]
struct TileWalk {
    tiles: Odometer,
    dom_lo: Vec<i128>,
    extents: Vec<i128>,
}

impl CellWalk {
    fn flat(lo: &[i128], hi: &[i128], layout: Layout) -> Self {
        Self {
            lo: lo.to_vec(),
            hi: hi.to_vec(),
            tiles: None,
            cell_order: layout,
            cells: Odometer::new(lo.to_vec(), hi.to_vec(), layout),
        }
    }
}

impl Iterator for CellWalk {
    type Item = Vec<i128>;

    fn next(&mut self) -> Option<Vec<i128>> {
        loop {
            if let Some(cell) = self.cells.next() {
                return Some(cell);
            }
            let walk = self.tiles.as_mut()?;
            let tile = walk.tiles.next()?;
            let (cell_lo, cell_hi) =
                clip_to_tile(&self.lo, &self.hi, &tile, &walk.dom_lo, &walk.extents);
            self.cells = Odometer::new(cell_lo, cell_hi, self.cell_order);
        }
    }
}

/// Row- or column-major walk over every point of `[lo, hi]`; row-major
/// moves the last dimension fastest, column-major the first
#[derive(Debug, Clone)]
pub(crate) struct Odometer {
    lo: Vec<i128>,
    hi: Vec<i128>,
    layout: Layout,
    next: Option<Vec<i128>>,
}

impl Odometer {
    pub fn new(lo: Vec<i128>, hi: Vec<i128>, layout: Layout) -> Self {
        let empty = lo.is_empty() || lo.iter().zip(&hi).any(|(l, h)| l > h);
        let next = if empty { None } else { Some(lo.clone()) };
        Self {
            lo,
            hi,
            layout,
            next,
        }
    }

    fn exhausted() -> Self {
        Self::new(Vec::new(), Vec::new(), Layout::RowMajor)
    }
}

impl Iterator for Odometer {
    type Item = Vec<i128>;

    fn next(&mut self) -> Option<Vec<i128>> {
        let current = self.next.take()?;
        let dim_num = current.len();

        // Advance the fastest-moving dimension, carrying into slower ones
        let mut succ = current.clone();
        for i in 0..dim_num {
            let d = dim_index(dim_num - 1 - i, dim_num, self.layout);
            if succ[d] < self.hi[d] {
                succ[d] += 1;
                self.next = Some(succ);
                return Some(current);
            }
            succ[d] = self.lo[d];
        }
        Some(current)
    }
}

/// Dimension visited at step `i` of a row- or column-major walk
fn dim_index(i: usize, dim_num: usize, layout: Layout) -> usize {
    match layout {
        Layout::ColMajor => dim_num - 1 - i,
        _ => i,
    }
}

fn cmp_tuple<T: CellValue>(a: &[u8], b: &[u8], dim_num: usize, layout: Layout) -> Ordering {
    for i in 0..dim_num {
        let d = dim_index(i, dim_num, layout);
        let va = T::read_le(&a[d * T::SIZE..]);
        let vb = T::read_le(&b[d * T::SIZE..]);
        match va.partial_cmp(&vb) {
            Some(Ordering::Equal) | None => continue,
            Some(ord) => return ord,
        }
    }
    Ordering::Equal
}
