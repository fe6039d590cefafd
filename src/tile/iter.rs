//! Cell iterators
//!
//! Both directions yield read-only [`CellView`]s borrowed from the tile
//! payload. A view is only valid while the tile is not mutated, which the
//! borrow checker enforces. Iterators are restartable: build a new one at
//! any position with [`Tile::iter_from`] or [`Tile::rev_iter_from`].

use crate::datatype::{del_value, empty_value, CellValue};

use super::{is_sentinel, Tile};

/// Read-only view of one cell
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a> {
    tile: &'a Tile,
    pos: u64,
    bytes: &'a [u8],
}

impl<'a> CellView<'a> {
    /// Position of the cell inside its tile
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Raw cell bytes
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First value of the cell decoded as `T`
    pub fn value<T: CellValue>(&self) -> T {
        T::read_le(self.bytes)
    }

    pub fn is_del(&self) -> bool {
        is_sentinel(self.bytes, &del_value(self.tile.cell_type()))
    }

    pub fn is_null(&self) -> bool {
        is_sentinel(self.bytes, &empty_value(self.tile.cell_type()))
    }

    /// See [`Tile::cell_inside_range`]
    pub fn inside_range<T: CellValue>(&self, range: &[T]) -> bool {
        self.tile.cell_inside_range(self.pos, range)
    }
}

/// Forward cell iterator
#[derive(Debug, Clone)]
pub struct CellIter<'a> {
    tile: &'a Tile,
    pos: u64,
}

impl<'a> CellIter<'a> {
    pub(super) fn new(tile: &'a Tile, pos: u64) -> Self {
        Self { tile, pos }
    }
}

impl<'a> Iterator for CellIter<'a> {
    type Item = CellView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.tile.cell(self.pos)?;
        let view = CellView {
            tile: self.tile,
            pos: self.pos,
            bytes,
        };
        self.pos += 1;
        Some(view)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.tile.cell_num().saturating_sub(self.pos) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for CellIter<'_> {}

/// Reverse cell iterator
#[derive(Debug, Clone)]
pub struct ReverseCellIter<'a> {
    tile: &'a Tile,
    /// Next position to yield, `None` once exhausted
    next: Option<u64>,
}

impl<'a> ReverseCellIter<'a> {
    pub(super) fn new(tile: &'a Tile, start: Option<u64>) -> Self {
        Self { tile, next: start }
    }
}

impl<'a> Iterator for ReverseCellIter<'a> {
    type Item = CellView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.next?;
        let bytes = self.tile.cell(pos)?;
        self.next = pos.checked_sub(1);
        Some(CellView {
            tile: self.tile,
            pos,
            bytes,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.next.map(|p| p as usize + 1).unwrap_or(0);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ReverseCellIter<'_> {}
