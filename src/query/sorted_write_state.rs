//! Row- and column-major write state
//!
//! Reorders caller cells into the array's global order before they reach a
//! fragment, which only accepts global order.
//!
//! - Dense writes without coordinates: the cells follow the layout over the
//!   subarray, so the position of each cell gives its coordinates.
//! - Writes carrying coordinates: cells are sorted by their coordinates and
//!   land in a sparse fragment.

use crate::error::{MosaicError, Result};
use crate::fragment::Fragment;
use crate::schema::Layout;
use crate::storage::Array;

use super::QueryBuffer;

/// Write state for WRITE_SORTED_ROW and WRITE_SORTED_COL
#[derive(Debug)]
pub(crate) struct ArraySortedWriteState {
    layout: Layout,
}

impl ArraySortedWriteState {
    pub fn new(layout: Layout) -> Self {
        debug_assert!(matches!(layout, Layout::RowMajor | Layout::ColMajor));
        Self { layout }
    }

    /// Write one submission into a fresh fragment (left open for the caller
    /// to finalize)
    pub fn write(
        &self,
        array: &Array,
        subarray: &[u8],
        attribute_ids: &[usize],
        buffers: &[QueryBuffer],
        cell_num: usize,
    ) -> Result<Fragment> {
        let schema = array.schema();
        let coords_slot = attribute_ids.iter().position(|&id| id == schema.coords_id());

        let mut order: Vec<usize> = (0..cell_num).collect();
        let dense = match coords_slot {
            None => {
                let expected = schema.cell_num_in_rect(subarray)?;
                if expected != cell_num as u64 {
                    return Err(MosaicError::Query(format!(
                        "Subarray holds {} cells, buffers hold {}",
                        expected, cell_num
                    )));
                }
                let grid = schema.dense_grid()?;
                let (lo, hi) = grid.bounds(subarray);
                let cells: Vec<Vec<u8>> = grid
                    .walk(&lo, &hi, self.layout)
                    .map(|cell| grid.encode(&cell))
                    .collect();
                order.sort_by(|&a, &b| schema.cmp_global(&cells[a], &cells[b]));
                true
            }
            Some(slot) => {
                order = global_order(array, &buffers[slot], cell_num);
                false
            }
        };

        let already_sorted = order.iter().enumerate().all(|(i, &o)| i == o);
        let mut fragment = Fragment::create(array, dense, subarray.to_vec(), false)?;
        if already_sorted {
            fragment.write(attribute_ids, buffers)?;
        } else {
            let sorted: Vec<QueryBuffer> = buffers
                .iter()
                .zip(attribute_ids)
                .map(|(b, &id)| b.permuted(&order, schema.cell_size(id)))
                .collect();
            fragment.write(attribute_ids, &sorted)?;
        }
        Ok(fragment)
    }
}

/// Stable permutation putting coordinate tuples in global order
pub(crate) fn global_order(array: &Array, coords: &QueryBuffer, cell_num: usize) -> Vec<usize> {
    let schema = array.schema();
    let size = schema.cell_size(schema.coords_id());
    let mut order: Vec<usize> = (0..cell_num).collect();
    order.sort_by(|&a, &b| schema.cmp_global(coords.cell(a, size), coords.cell(b, size)));
    order
}
