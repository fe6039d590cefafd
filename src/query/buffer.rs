//! Query buffers
//!
//! One [`QueryBuffer`] per requested attribute. Writes read cells out of
//! it; reads clear it and refill it up to its capacity.
//!
//! ## Variable-sized cells
//! ```text
//! offsets: [0, 3, 7]            one u64 per cell, relative to `values`
//! values:  a b c d e f g h i    cell i = values[offsets[i]..offsets[i+1]]
//! ```

use crate::datatype::{decode_values, encode_values, CellValue};
use crate::error::{MosaicError, Result};

/// Caller-owned cell buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuffer {
    values: Vec<u8>,
    /// Cell offsets into `values`, present for variable-sized attributes
    offsets: Option<Vec<u64>>,
    /// Maximum bytes a read may place in `values`
    values_capacity: usize,
    /// Maximum offsets a read may place in `offsets`
    offsets_capacity: usize,
}

impl QueryBuffer {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Fixed-size cells from typed values
    pub fn from_values<T: CellValue>(values: &[T]) -> Self {
        Self::from_bytes(encode_values(values))
    }

    /// Fixed-size cells from raw little-endian bytes
    pub fn from_bytes(values: Vec<u8>) -> Self {
        Self {
            values_capacity: values.len(),
            values,
            offsets: None,
            offsets_capacity: 0,
        }
    }

    /// Variable-sized cells from offsets and values
    pub fn var(offsets: Vec<u64>, values: Vec<u8>) -> Self {
        Self {
            values_capacity: values.len(),
            offsets_capacity: offsets.len(),
            values,
            offsets: Some(offsets),
        }
    }

    /// Variable-sized `Char` cells, one per string
    pub fn from_strings<S: AsRef<str>>(strings: &[S]) -> Self {
        let mut offsets = Vec::with_capacity(strings.len());
        let mut values = Vec::new();
        for s in strings {
            offsets.push(values.len() as u64);
            values.extend_from_slice(s.as_ref().as_bytes());
        }
        Self::var(offsets, values)
    }

    /// Empty fixed-size read buffer holding at most `bytes`
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            values: Vec::with_capacity(bytes),
            offsets: None,
            values_capacity: bytes,
            offsets_capacity: 0,
        }
    }

    /// Empty variable-sized read buffer holding at most `cells` cells and
    /// `bytes` value bytes
    pub fn var_with_capacity(cells: usize, bytes: usize) -> Self {
        Self {
            values: Vec::with_capacity(bytes),
            offsets: Some(Vec::with_capacity(cells)),
            values_capacity: bytes,
            offsets_capacity: cells,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn offsets(&self) -> Option<&[u64]> {
        self.offsets.as_deref()
    }

    pub fn is_var(&self) -> bool {
        self.offsets.is_some()
    }

    /// Bytes currently held in `values`
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Bytes currently held in `offsets`
    pub fn offsets_size(&self) -> usize {
        self.offsets.as_ref().map(|o| o.len() * 8).unwrap_or(0)
    }

    pub fn values_capacity(&self) -> usize {
        self.values_capacity
    }

    pub fn offsets_capacity(&self) -> usize {
        self.offsets_capacity
    }

    /// Fixed-size values decoded as `T`
    pub fn to_vec<T: CellValue>(&self) -> Vec<T> {
        decode_values(&self.values)
    }

    /// Variable-sized cells as byte slices
    pub fn var_cells(&self) -> Vec<&[u8]> {
        match &self.offsets {
            Some(offsets) => (0..offsets.len()).map(|i| self.var_cell(offsets, i)).collect(),
            None => Vec::new(),
        }
    }

    /// Variable-sized `Char` cells as strings
    pub fn strings(&self) -> Vec<String> {
        self.var_cells()
            .into_iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    // =========================================================================
    // Engine-side access
    // =========================================================================

    /// Number of cells held, checking the buffer against the attribute shape
    pub(crate) fn cell_num(&self, cell_size: Option<usize>) -> Result<usize> {
        match (cell_size, &self.offsets) {
            (Some(size), None) => {
                if self.values.len() % size != 0 {
                    return Err(MosaicError::Query(format!(
                        "Buffer of {} bytes is not a multiple of the cell size {}",
                        self.values.len(),
                        size
                    )));
                }
                Ok(self.values.len() / size)
            }
            (None, Some(offsets)) => {
                if offsets.first().map(|&o| o != 0).unwrap_or(false)
                    || offsets.windows(2).any(|w| w[0] >= w[1])
                    || offsets.last().map(|&o| o >= self.values.len() as u64).unwrap_or(false)
                {
                    return Err(MosaicError::Query(
                        "Variable cell offsets must start at 0, strictly increase and stay inside the values"
                            .to_string(),
                    ));
                }
                Ok(offsets.len())
            }
            (Some(_), Some(_)) => Err(MosaicError::Query(
                "Fixed-size attribute given a variable-sized buffer".to_string(),
            )),
            (None, None) => Err(MosaicError::Query(
                "Variable-sized attribute given a buffer without offsets".to_string(),
            )),
        }
    }

    /// Bytes of cell `i` (the buffer must have passed `cell_num`)
    pub(crate) fn cell(&self, i: usize, cell_size: Option<usize>) -> &[u8] {
        match (cell_size, &self.offsets) {
            (Some(size), _) => &self.values[i * size..(i + 1) * size],
            (None, Some(offsets)) => self.var_cell(offsets, i),
            (None, None) => &[],
        }
    }

    fn var_cell(&self, offsets: &[u64], i: usize) -> &[u8] {
        let start = offsets[i] as usize;
        let end = offsets
            .get(i + 1)
            .map(|&o| o as usize)
            .unwrap_or(self.values.len());
        &self.values[start..end]
    }

    /// A copy holding the cells in `order`
    pub(crate) fn permuted(&self, order: &[usize], cell_size: Option<usize>) -> Self {
        match cell_size {
            Some(_) => {
                let mut values = Vec::with_capacity(self.values.len());
                for &i in order {
                    values.extend_from_slice(self.cell(i, cell_size));
                }
                Self::from_bytes(values)
            }
            None => {
                let mut offsets = Vec::with_capacity(order.len());
                let mut values = Vec::with_capacity(self.values.len());
                for &i in order {
                    offsets.push(values.len() as u64);
                    values.extend_from_slice(self.cell(i, None));
                }
                Self::var(offsets, values)
            }
        }
    }

    /// Drop held cells before a read refills the buffer
    pub(crate) fn clear(&mut self) {
        self.values.clear();
        if let Some(offsets) = &mut self.offsets {
            offsets.clear();
        }
    }

    /// True if one more cell of `len` bytes fits
    pub(crate) fn has_room(&self, len: usize) -> bool {
        let values_fit = self.values.len() + len <= self.values_capacity;
        match &self.offsets {
            Some(offsets) => values_fit && offsets.len() < self.offsets_capacity,
            None => values_fit,
        }
    }

    /// Append one cell (callers check `has_room` first)
    pub(crate) fn push_cell(&mut self, cell: &[u8]) {
        if let Some(offsets) = &mut self.offsets {
            offsets.push(self.values.len() as u64);
        }
        self.values.extend_from_slice(cell);
    }
}
