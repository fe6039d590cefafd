//! Tests for dense reads and writes
//!
//! These tests verify:
//! - Cells no fragment covers carry the empty sentinel
//! - Global order walks space tiles in tile order
//! - Row- and column-major writes land in the right cells
//! - Unordered writes into a dense array overlay earlier fragments
//! - Overflowed reads resume in every layout, even over a full i64 domain

use mosaicdb::constants::COORDS;
use mosaicdb::{
    ArrayType, Attribute, Datatype, Dimension, Layout, MosaicError, QueryBuffer, QueryStatus,
    QueryType,
};

use super::*;

// =============================================================================
// Helper Functions
// =============================================================================

const E: i32 = i32::MAX;

fn read_values(array: &mosaicdb::Array, layout: Layout, subarray: &[i32]) -> Vec<i32> {
    let mut query = array
        .query(QueryType::Read)
        .layout(layout)
        .subarray(subarray)
        .buffers(vec![QueryBuffer::with_capacity(4 * 16)])
        .build()
        .unwrap();
    assert_eq!(query.submit().unwrap(), QueryStatus::Completed);
    query.buffer(0).unwrap().to_vec::<i32>()
}

/// Write `values` over `subarray` in `layout`
fn write_dense(array: &mosaicdb::Array, layout: Layout, subarray: &[i32], values: &[i32]) {
    let mut query = array
        .query(QueryType::Write)
        .layout(layout)
        .subarray(subarray)
        .buffers(vec![QueryBuffer::from_values(values)])
        .build()
        .unwrap();
    query.submit().unwrap();
    query.finalize().unwrap();
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_empty_cells_carry_sentinel() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    // Rows 1-2 in global order: tile (0,0) then tile (0,1)
    write_dense(&array, Layout::GlobalOrder, &[1, 2, 1, 4], &[0, 1, 2, 3, 4, 5, 6, 7]);

    let global = read_values(&array, Layout::GlobalOrder, &[1, 4, 1, 4]);
    assert_eq!(
        global,
        vec![0, 1, 2, 3, 4, 5, 6, 7, E, E, E, E, E, E, E, E]
    );

    let row = read_values(&array, Layout::RowMajor, &[1, 4, 1, 4]);
    assert_eq!(
        row,
        vec![0, 1, 4, 5, 2, 3, 6, 7, E, E, E, E, E, E, E, E]
    );
}

#[test]
fn test_read_empty_dense_array() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    assert_eq!(read_values(&array, Layout::GlobalOrder, &[3, 4, 3, 3]), vec![E, E]);
}

#[test]
fn test_dense_read_with_coordinates() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");
    write_dense(&array, Layout::RowMajor, &[2, 3, 2, 3], &[22, 23, 32, 33]);

    let mut query = array
        .query(QueryType::Read)
        .layout(Layout::ColMajor)
        .subarray(&[2i32, 3, 2, 3])
        .attributes(&["a1", COORDS])
        .buffers(vec![QueryBuffer::with_capacity(16), QueryBuffer::with_capacity(32)])
        .build()
        .unwrap();
    query.submit().unwrap();

    assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![22, 32, 23, 33]);
    assert_eq!(
        query.buffer(1).unwrap().to_vec::<i32>(),
        vec![2, 2, 3, 2, 2, 3, 3, 3]
    );
}

#[test]
fn test_dense_read_resumes_after_overflow() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");
    let values: Vec<i32> = (1..=4)
        .flat_map(|r| (1..=4).map(move |c| 10 * r + c))
        .collect();
    write_dense(&array, Layout::RowMajor, &[1, 4, 1, 4], &values);

    for layout in [Layout::GlobalOrder, Layout::RowMajor, Layout::ColMajor] {
        let full = read_values(&array, layout, &[1, 4, 1, 4]);

        // Room for five cells per submission
        let mut query = array
            .query(QueryType::Read)
            .layout(layout)
            .buffers(vec![QueryBuffer::with_capacity(4 * 5)])
            .build()
            .unwrap();
        let mut seen = Vec::new();
        let mut statuses = Vec::new();
        loop {
            let status = query.submit().unwrap();
            statuses.push(status);
            seen.extend(query.buffer(0).unwrap().to_vec::<i32>());
            if status == QueryStatus::Completed {
                break;
            }
            assert!(query.overflow(0));
        }

        assert_eq!(seen, full, "{:?}", layout);
        assert_eq!(
            statuses,
            vec![
                QueryStatus::Overflowed,
                QueryStatus::Overflowed,
                QueryStatus::Overflowed,
                QueryStatus::Completed
            ]
        );
        assert!(query.read_done());
    }
}

#[test]
fn test_read_over_full_i64_domain() {
    let manager = memory_manager();
    for extent in [None, Some(1i64 << 40)] {
        let mut rows = Dimension::new("rows", 0i64, i64::MAX);
        if let Some(extent) = extent {
            rows = rows.with_tile_extent(extent);
        }
        let schema = manager
            .schema_builder(ArrayType::Dense)
            .attribute(Attribute::new("a1", Datatype::Int32))
            .dimension(rows)
            .build()
            .unwrap();
        let uri = format!("mem://huge_{}", extent.is_some());
        manager.array_create(&uri, &schema).unwrap();
        let array = manager.array_open(&uri).unwrap();

        let mut write = array
            .query(QueryType::Write)
            .subarray(&[0i64, 3])
            .buffers(vec![QueryBuffer::from_values(&[1i32, 2, 3, 4])])
            .build()
            .unwrap();
        write.submit().unwrap();
        write.finalize().unwrap();

        // Sixteen cells per submission out of the whole domain
        let mut query = array
            .query(QueryType::Read)
            .buffers(vec![QueryBuffer::with_capacity(64)])
            .build()
            .unwrap();
        assert_eq!(query.submit().unwrap(), QueryStatus::Overflowed);
        let mut expected = vec![1, 2, 3, 4];
        expected.extend([E; 12]);
        assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), expected);

        assert_eq!(query.submit().unwrap(), QueryStatus::Overflowed);
        assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![E; 16]);
        assert!(!query.read_done());
    }
}

#[test]
fn test_cell_count_over_full_domain_is_allocation_error() {
    let manager = memory_manager();
    let schema = manager
        .schema_builder(ArrayType::Dense)
        .attribute(Attribute::new("a1", Datatype::Int32))
        .dimension(Dimension::new("rows", i64::MIN, i64::MAX))
        .build()
        .unwrap();
    assert!(matches!(
        schema.cell_num_in_rect(&schema.domain()),
        Err(MosaicError::Allocation(_))
    ));

    // A dense write over the whole domain cannot be sized
    manager.array_create("mem://full", &schema).unwrap();
    let array = manager.array_open("mem://full").unwrap();
    let write = array
        .query(QueryType::Write)
        .buffers(vec![QueryBuffer::from_values(&[1i32])])
        .build()
        .unwrap()
        .submit();
    assert!(matches!(write, Err(MosaicError::Allocation(_))));
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_row_major_write() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    let values: Vec<i32> = (1..=4)
        .flat_map(|r| (1..=4).map(move |c| 10 * r + c))
        .collect();
    write_dense(&array, Layout::RowMajor, &[1, 4, 1, 4], &values);

    assert_eq!(read_values(&array, Layout::RowMajor, &[1, 4, 1, 4]), values);
    assert_eq!(
        read_values(&array, Layout::GlobalOrder, &[1, 2, 1, 4]),
        vec![11, 12, 21, 22, 13, 14, 23, 24]
    );
}

#[test]
fn test_col_major_write() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    write_dense(&array, Layout::ColMajor, &[1, 2, 1, 2], &[11, 21, 12, 22]);

    assert_eq!(
        read_values(&array, Layout::RowMajor, &[1, 2, 1, 2]),
        vec![11, 12, 21, 22]
    );
}

#[test]
fn test_newer_fragment_overlays_older() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    write_dense(&array, Layout::RowMajor, &[1, 2, 1, 2], &[1, 2, 3, 4]);
    write_dense(&array, Layout::RowMajor, &[2, 2, 1, 2], &[30, 40]);

    assert_eq!(
        read_values(&array, Layout::RowMajor, &[1, 2, 1, 2]),
        vec![1, 2, 30, 40]
    );
}

#[test]
fn test_unordered_write_into_dense_array() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");
    write_dense(&array, Layout::RowMajor, &[1, 1, 1, 4], &[1, 2, 3, 4]);

    let mut query = array
        .query(QueryType::Write)
        .layout(Layout::Unordered)
        .buffers(vec![
            QueryBuffer::from_values(&[99i32, 77]),
            QueryBuffer::from_values(&[4i32, 4, 1, 3]),
        ])
        .build()
        .unwrap();
    query.submit().unwrap();
    query.finalize().unwrap();

    assert_eq!(array.fragment_num().unwrap(), 2);
    assert_eq!(
        read_values(&array, Layout::RowMajor, &[1, 1, 1, 4]),
        vec![1, 2, 77, 4]
    );
    assert_eq!(read_values(&array, Layout::RowMajor, &[4, 4, 4, 4]), vec![99]);
}

#[test]
fn test_dense_write_cell_count_must_match_subarray() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    let mut sorted = array
        .query(QueryType::Write)
        .layout(Layout::RowMajor)
        .subarray(&[1i32, 2, 1, 2])
        .buffers(vec![QueryBuffer::from_values(&[1i32, 2, 3])])
        .build()
        .unwrap();
    assert!(matches!(sorted.submit(), Err(MosaicError::Query(_))));

    // WRITE accepts the cells over several submissions, but not too many
    let mut global = array
        .query(QueryType::Write)
        .subarray(&[1i32, 2, 1, 2])
        .buffers(vec![QueryBuffer::from_values(&[1i32, 2, 3])])
        .build()
        .unwrap();
    global.submit().unwrap();
    global
        .reset_buffers(vec![QueryBuffer::from_values(&[4i32, 5])])
        .unwrap();
    assert!(matches!(global.submit(), Err(MosaicError::Query(_))));

    drop(sorted);
    drop(global);
    assert_eq!(array.fragment_num().unwrap(), 0);
}

#[test]
fn test_dense_write_over_several_submissions() {
    let manager = memory_manager();
    let array = dense_array(&manager, "mem://dense");

    let mut query = array
        .query(QueryType::Write)
        .subarray(&[1i32, 2, 1, 2])
        .buffers(vec![QueryBuffer::from_values(&[1i32, 2])])
        .build()
        .unwrap();
    query.submit().unwrap();
    query
        .reset_buffers(vec![QueryBuffer::from_values(&[3i32, 4])])
        .unwrap();
    query.submit().unwrap();
    query.finalize().unwrap();

    assert_eq!(
        read_values(&array, Layout::RowMajor, &[1, 2, 1, 2]),
        vec![1, 2, 3, 4]
    );
}
