//! Query Module
//!
//! Single entry and exit point of one read or write operation.
//!
//! ## Dispatch
//! ```text
//!                      ┌──────────────────────────────────────────┐
//!                      │                 Query                    │
//!                      │  attributes → ids, subarray, buffers     │
//!                      └───────────────────┬──────────────────────┘
//!          ┌───────────────┬───────────────┼───────────────┬───────────────┐
//!          ▼               ▼               ▼               ▼               ▼
//!        READ        READ_SORTED_*       WRITE      WRITE_SORTED_*  WRITE_UNORDERED
//!    ArrayReadState (streamed in the     one open       ArraySorted-    sort by global
//!    layout, resumable after overflow)   fragment,      WriteState      order, then
//!                                        kept across    (reorder)       write
//!                                        submissions
//!                                                    └── fragment finalized per submission ──┘
//! ```
//!
//! ## Status
//! ```text
//! IN_PROGRESS ──► COMPLETED
//!             ──► OVERFLOWED   (reads: buffers full, resubmit to resume)
//!             ──► FAILED       (terminal)
//! ```

mod async_submit;
mod buffer;
mod read_state;
mod sorted_read_state;
mod sorted_write_state;

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, error};

use crate::datatype::{encode_values, CellValue};
use crate::error::{MosaicError, Result};
use crate::fragment::Fragment;
use crate::storage::Array;

pub use crate::schema::Layout;
pub use async_submit::{submit_async, AsyncOutcome};
pub use buffer::QueryBuffer;

use read_state::ArrayReadState;
use sorted_write_state::{global_order, ArraySortedWriteState};

/// Completion callback invoked after every successful submission
pub type QueryCallback = Box<dyn FnMut(QueryStatus) + Send>;

/// Direction of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Read,
    Write,
}

/// Query mode, derived from the query type and the requested layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Read,
    ReadSortedRow,
    ReadSortedCol,
    Write,
    WriteSortedRow,
    WriteSortedCol,
    WriteUnordered,
}

impl QueryMode {
    /// Resolve the mode for a query type and layout
    pub fn new(query_type: QueryType, layout: Layout) -> Result<Self> {
        Ok(match (query_type, layout) {
            (QueryType::Read, Layout::GlobalOrder) => QueryMode::Read,
            (QueryType::Read, Layout::RowMajor) => QueryMode::ReadSortedRow,
            (QueryType::Read, Layout::ColMajor) => QueryMode::ReadSortedCol,
            (QueryType::Read, Layout::Unordered) => {
                return Err(MosaicError::Query(
                    "Cannot read with the unordered layout".to_string(),
                ))
            }
            (QueryType::Write, Layout::GlobalOrder) => QueryMode::Write,
            (QueryType::Write, Layout::RowMajor) => QueryMode::WriteSortedRow,
            (QueryType::Write, Layout::ColMajor) => QueryMode::WriteSortedCol,
            (QueryType::Write, Layout::Unordered) => QueryMode::WriteUnordered,
        })
    }

    pub fn is_read(&self) -> bool {
        matches!(
            self,
            QueryMode::Read | QueryMode::ReadSortedRow | QueryMode::ReadSortedCol
        )
    }

    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    pub fn layout(&self) -> Layout {
        match self {
            QueryMode::Read | QueryMode::Write => Layout::GlobalOrder,
            QueryMode::ReadSortedRow | QueryMode::WriteSortedRow => Layout::RowMajor,
            QueryMode::ReadSortedCol | QueryMode::WriteSortedCol => Layout::ColMajor,
            QueryMode::WriteUnordered => Layout::Unordered,
        }
    }
}

/// Progress of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    InProgress,
    Completed,
    /// Some read buffer was too small; resubmit to continue
    Overflowed,
    Failed,
}

/// Layout-specific algorithm, chosen once at init
#[derive(Debug)]
enum ArrayState {
    None,
    Read(ArrayReadState),
    SortedWrite(ArraySortedWriteState),
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for Query
pub struct QueryBuilder {
    array: Array,
    query_type: QueryType,
    layout: Layout,
    subarray: Option<Vec<u8>>,
    attributes: Option<Vec<String>>,
    attribute_ids: Option<Vec<usize>>,
    buffers: Vec<QueryBuffer>,
    callback: Option<QueryCallback>,
}

impl QueryBuilder {
    pub(crate) fn new(array: Array, query_type: QueryType) -> Self {
        Self {
            array,
            query_type,
            layout: Layout::GlobalOrder,
            subarray: None,
            attributes: None,
            attribute_ids: None,
            buffers: Vec::new(),
            callback: None,
        }
    }

    /// Cell layout of the caller's buffers (default: global order)
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Region of interest, `[lo, hi]` per dimension (default: whole domain)
    pub fn subarray<T: CellValue>(mut self, subarray: &[T]) -> Self {
        self.subarray = Some(encode_values(subarray));
        self
    }

    /// Region of interest already encoded in the coordinates type
    pub fn subarray_bytes(mut self, subarray: Vec<u8>) -> Self {
        self.subarray = Some(subarray);
        self
    }

    /// Attributes to read or write, in buffer order (default: all)
    pub fn attributes<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.attributes = Some(names.iter().map(|n| n.as_ref().to_string()).collect());
        self
    }

    /// Attribute ids chosen by a higher layer; the coordinates are appended
    /// when missing
    pub(crate) fn attribute_ids(mut self, ids: Vec<usize>) -> Self {
        self.attribute_ids = Some(ids);
        self
    }

    /// One buffer per attribute, in attribute order
    pub fn buffers(mut self, buffers: Vec<QueryBuffer>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Completion callback
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(QueryStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Validate and initialize the query
    pub fn build(self) -> Result<Query> {
        let mode = QueryMode::new(self.query_type, self.layout)?;
        let schema = self.array.schema();

        // Step 1: Attributes
        let attribute_ids = match (self.attribute_ids, self.attributes) {
            (Some(ids), _) => resolve_attribute_ids(&self.array, ids)?,
            (None, Some(names)) => resolve_attribute_names(&self.array, &names)?,
            (None, None) => default_attribute_ids(&self.array, mode),
        };

        // Step 2: Subarray
        let subarray = match self.subarray {
            Some(subarray) => {
                schema.validate_subarray(&subarray)?;
                subarray
            }
            None => schema.domain(),
        };

        // Step 3: Writes must cover the whole schema
        if mode.is_write() {
            for id in 0..schema.attribute_num() {
                if !attribute_ids.contains(&id) {
                    return Err(MosaicError::Query(format!(
                        "Writes must include attribute '{}'",
                        schema.attribute_name(id)
                    )));
                }
            }
            let needs_coords = !schema.dense() || mode == QueryMode::WriteUnordered;
            if needs_coords && !attribute_ids.contains(&schema.coords_id()) {
                return Err(MosaicError::Query(
                    "Sparse and unordered writes must include the coordinates".to_string(),
                ));
            }
        }

        let mut query = Query {
            array: self.array,
            mode,
            status: QueryStatus::InProgress,
            subarray,
            overflow: vec![false; attribute_ids.len()],
            attribute_ids,
            buffers: Vec::new(),
            fragments: Vec::new(),
            state: ArrayState::None,
            callback: self.callback,
        };
        query.reset_buffers(self.buffers)?;

        // Step 4: Array state and fragments
        query.state = match mode {
            QueryMode::Read | QueryMode::ReadSortedRow | QueryMode::ReadSortedCol => {
                let slab_cells = query.array.config().sort_slab_cells;
                ArrayState::Read(ArrayReadState::new(mode.layout(), slab_cells))
            }
            QueryMode::WriteSortedRow | QueryMode::WriteSortedCol => {
                ArrayState::SortedWrite(ArraySortedWriteState::new(mode.layout()))
            }
            QueryMode::Write | QueryMode::WriteUnordered => ArrayState::None,
        };
        if mode.is_read() {
            query.open_fragments()?;
        }

        debug!(
            array = %query.array.uri(),
            mode = ?mode,
            attributes = query.attribute_ids.len(),
            fragments = query.fragments.len(),
            "Initialized query"
        );
        Ok(query)
    }
}

/// Attribute ids given directly: checked, deduplicated, coordinates appended
fn resolve_attribute_ids(array: &Array, mut ids: Vec<usize>) -> Result<Vec<usize>> {
    let coords_id = array.schema().coords_id();
    let mut seen = HashSet::new();
    for &id in &ids {
        if id > coords_id {
            return Err(MosaicError::Query(format!("Invalid attribute id {}", id)));
        }
        if !seen.insert(id) {
            return Err(MosaicError::Query(format!(
                "Duplicate attribute '{}'",
                array.schema().attribute_name(id)
            )));
        }
    }
    if !seen.contains(&coords_id) {
        ids.push(coords_id);
    }
    Ok(ids)
}

fn resolve_attribute_names(array: &Array, names: &[String]) -> Result<Vec<usize>> {
    let max_len = array.config().name_max_len;
    let mut seen = HashSet::new();
    for name in names {
        if name.len() > max_len {
            return Err(MosaicError::Query(format!(
                "Attribute name '{}' exceeds {} characters",
                name, max_len
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(MosaicError::Query(format!("Duplicate attribute '{}'", name)));
        }
    }
    array.schema().attribute_ids(names)
}

/// All attributes; the coordinates only where they are not implicit
fn default_attribute_ids(array: &Array, mode: QueryMode) -> Vec<usize> {
    let schema = array.schema();
    if schema.dense() && mode != QueryMode::WriteUnordered {
        (0..schema.attribute_num()).collect()
    } else {
        (0..=schema.attribute_num()).collect()
    }
}

// =============================================================================
// Query
// =============================================================================

/// One read or write operation over an array
pub struct Query {
    array: Array,
    mode: QueryMode,
    status: QueryStatus,
    subarray: Vec<u8>,
    /// Resolved ids, one per buffer
    attribute_ids: Vec<usize>,
    buffers: Vec<QueryBuffer>,
    /// Per-buffer overflow of the last read submission
    overflow: Vec<bool>,
    /// Reads: every fragment overlapping the subarray, oldest first.
    /// Writes: the open fragment(s)
    fragments: Vec<Fragment>,
    state: ArrayState,
    callback: Option<QueryCallback>,
}

impl Query {
    /// Process the query: read into or write from the current buffers
    ///
    /// On success the status becomes COMPLETED, or OVERFLOWED for reads that
    /// could not place every cell, and the callback runs. On error the
    /// status becomes FAILED, which is terminal.
    pub fn submit(&mut self) -> Result<QueryStatus> {
        if self.status == QueryStatus::Failed {
            return Err(MosaicError::Query(
                "Cannot resubmit a failed query".to_string(),
            ));
        }
        self.status = QueryStatus::InProgress;

        let result = if self.mode.is_read() {
            self.read()
        } else {
            self.write()
        };

        match result {
            Ok(()) => {
                self.status = if self.mode.is_read() && self.overflow.iter().any(|&o| o) {
                    QueryStatus::Overflowed
                } else {
                    QueryStatus::Completed
                };
                debug!(mode = ?self.mode, status = ?self.status, "Query processed");
                if let Some(callback) = self.callback.as_mut() {
                    callback(self.status);
                }
                Ok(self.status)
            }
            Err(e) => {
                error!(array = %self.array.uri(), mode = ?self.mode, error = %e, "Query failed");
                self.status = QueryStatus::Failed;
                Err(e)
            }
        }
    }

    /// Install the completion callback
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(QueryStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Replace the buffers (e.g. larger ones after an overflow)
    pub fn reset_buffers(&mut self, buffers: Vec<QueryBuffer>) -> Result<()> {
        if buffers.len() != self.attribute_ids.len() {
            return Err(MosaicError::Query(format!(
                "Expected {} buffers, got {}",
                self.attribute_ids.len(),
                buffers.len()
            )));
        }
        let schema = self.array.schema();
        for (buffer, &id) in buffers.iter().zip(&self.attribute_ids) {
            if buffer.is_var() != schema.var_size(id) {
                return Err(MosaicError::Query(format!(
                    "Buffer shape does not match attribute '{}'",
                    schema.attribute_name(id)
                )));
            }
        }
        self.buffers = buffers;
        Ok(())
    }

    /// Finalize open write fragments (reads just release their fragments)
    pub fn finalize(&mut self) -> Result<()> {
        if self.mode.is_write() {
            self.clear_fragments()
        } else {
            self.fragments.clear();
            Ok(())
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn array(&self) -> &Array {
        &self.array
    }

    pub fn subarray(&self) -> &[u8] {
        &self.subarray
    }

    pub fn attribute_ids(&self) -> &[usize] {
        &self.attribute_ids
    }

    pub fn buffers(&self) -> &[QueryBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, slot: usize) -> Option<&QueryBuffer> {
        self.buffers.get(slot)
    }

    /// Buffer of an attribute by name (`__coords` for the coordinates)
    pub fn buffer_by_name(&self, name: &str) -> Option<&QueryBuffer> {
        let id = self.array.schema().attribute_id(name).ok()?;
        let slot = self.attribute_ids.iter().position(|&a| a == id)?;
        self.buffers.get(slot)
    }

    /// Take the buffers out, leaving empty ones with zero capacity
    pub fn take_buffers(&mut self) -> Vec<QueryBuffer> {
        let schema = self.array.schema();
        let empty = self
            .attribute_ids
            .iter()
            .map(|&id| {
                if schema.var_size(id) {
                    QueryBuffer::var_with_capacity(0, 0)
                } else {
                    QueryBuffer::with_capacity(0)
                }
            })
            .collect();
        std::mem::replace(&mut self.buffers, empty)
    }

    /// True if the buffer of `attribute_id` overflowed during the last read
    pub fn overflow(&self, attribute_id: usize) -> bool {
        self.attribute_ids
            .iter()
            .position(|&a| a == attribute_id)
            .map(|slot| self.overflow[slot])
            .unwrap_or(false)
    }

    /// Buffer position of the coordinates, if requested
    pub fn coords_buffer_index(&self) -> Option<usize> {
        let coords_id = self.array.schema().coords_id();
        self.attribute_ids.iter().position(|&a| a == coords_id)
    }

    /// Fragments currently held (open for writing, or opened for reading)
    pub fn fragment_num(&self) -> usize {
        self.fragments.len()
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    fn open_fragments(&mut self) -> Result<()> {
        let schema = self.array.schema();
        for metadata in self.array.fragment_metadata()? {
            if schema.rects_overlap(metadata.non_empty_domain(), &self.subarray) {
                self.fragments.push(Fragment::open(&self.array, metadata));
            }
        }
        Ok(())
    }

    fn read(&mut self) -> Result<()> {
        let schema = self.array.schema();
        match &mut self.state {
            ArrayState::Read(state) => state.read(
                schema,
                &mut self.fragments,
                &self.subarray,
                &self.attribute_ids,
                &mut self.buffers,
                &mut self.overflow,
            ),
            _ => Err(MosaicError::Query(format!(
                "Query in mode {:?} cannot read",
                self.mode
            ))),
        }
    }

    /// True once every qualifying cell has been handed out
    pub fn read_done(&self) -> bool {
        match &self.state {
            ArrayState::Read(state) => state.done(),
            _ => false,
        }
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    fn write(&mut self) -> Result<()> {
        let cell_num = self.write_cell_num()?;
        match self.mode {
            QueryMode::Write => self.write_default(),
            QueryMode::WriteSortedRow | QueryMode::WriteSortedCol => {
                if let ArrayState::SortedWrite(state) = &self.state {
                    let fragment = state.write(
                        &self.array,
                        &self.subarray,
                        &self.attribute_ids,
                        &self.buffers,
                        cell_num,
                    )?;
                    self.fragments.push(fragment);
                }
                self.clear_fragments()
            }
            QueryMode::WriteUnordered => {
                self.write_unordered(cell_num)?;
                self.clear_fragments()
            }
            _ => Err(MosaicError::Query(format!(
                "Query in mode {:?} cannot write",
                self.mode
            ))),
        }
    }

    /// Append to one fragment kept open across submissions
    fn write_default(&mut self) -> Result<()> {
        if self.fragments.is_empty() {
            let dense = self.array.schema().dense() && self.coords_buffer_index().is_none();
            let fragment = Fragment::create(&self.array, dense, self.subarray.clone(), true)?;
            self.fragments.push(fragment);
        }
        self.fragments[0].write(&self.attribute_ids, &self.buffers)
    }

    /// Sort the submission by global order and write it to a new fragment
    fn write_unordered(&mut self, cell_num: usize) -> Result<()> {
        let schema = self.array.schema();
        let coords_slot = self.coords_buffer_index().ok_or_else(|| {
            MosaicError::Query("Unordered writes must include the coordinates".to_string())
        })?;

        let order = global_order(&self.array, &self.buffers[coords_slot], cell_num);
        let sorted: Vec<QueryBuffer> = self
            .buffers
            .iter()
            .zip(&self.attribute_ids)
            .map(|(b, &id)| b.permuted(&order, schema.cell_size(id)))
            .collect();

        let mut fragment = Fragment::create(&self.array, false, self.subarray.clone(), false)?;
        fragment.write(&self.attribute_ids, &sorted)?;
        self.fragments.push(fragment);
        Ok(())
    }

    /// Validate write buffers and return their common cell count
    fn write_cell_num(&self) -> Result<usize> {
        let schema = self.array.schema();
        let mut cell_num = None;
        for (buffer, &id) in self.buffers.iter().zip(&self.attribute_ids) {
            let n = buffer.cell_num(schema.cell_size(id))?;
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
        }
        Ok(cell_num.unwrap_or(0))
    }

    /// Finalize and release every held fragment
    fn clear_fragments(&mut self) -> Result<()> {
        for mut fragment in self.fragments.drain(..) {
            fragment.finalize()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("array", &self.array.uri())
            .field("mode", &self.mode)
            .field("status", &self.status)
            .field("attribute_ids", &self.attribute_ids)
            .field("fragments", &self.fragments.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Query {
    /// Open write fragments are finalized, unless the query failed; then
    /// they are discarded when dropped
    fn drop(&mut self) {
        if self.mode.is_write() && self.status != QueryStatus::Failed {
            if let Err(e) = self.clear_fragments() {
                error!(array = %self.array.uri(), error = %e, "Failed to finalize query on drop");
            }
        }
    }
}
