//! Tests for cell orderings and rectangle geometry
//!
//! These tests verify:
//! - Row- and column-major comparison
//! - Global order visits space tiles before cells
//! - Subarray validation and rectangle predicates

use std::cmp::Ordering;

use mosaicdb::datatype::encode_values;
use mosaicdb::{ArraySchema, ArrayType, Attribute, Datatype, Dimension, Layout, MosaicError};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema_4x4(tiled: bool) -> ArraySchema {
    let (rows, cols) = if tiled {
        (
            Dimension::new("rows", 1i32, 4).with_tile_extent(2i32),
            Dimension::new("cols", 1i32, 4).with_tile_extent(2i32),
        )
    } else {
        (Dimension::new("rows", 1i32, 4), Dimension::new("cols", 1i32, 4))
    };
    ArraySchema::builder(ArrayType::Sparse)
        .attribute(Attribute::new("a", Datatype::Int32))
        .dimension(rows)
        .dimension(cols)
        .build()
        .unwrap()
}

fn c(row: i32, col: i32) -> Vec<u8> {
    encode_values(&[row, col])
}

fn sorted(schema: &ArraySchema, mut cells: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    cells.sort_by(|a, b| schema.cmp_global(&c(a.0, a.1), &c(b.0, b.1)));
    cells
}

// =============================================================================
// Comparator Tests
// =============================================================================

#[test]
fn test_row_and_col_major() {
    let schema = schema_4x4(false);

    assert_eq!(
        schema.cmp_cell_order(&c(1, 3), &c(2, 1), Layout::RowMajor),
        Ordering::Less
    );
    assert_eq!(
        schema.cmp_cell_order(&c(1, 3), &c(2, 1), Layout::ColMajor),
        Ordering::Greater
    );
    assert_eq!(
        schema.cmp_cell_order(&c(2, 2), &c(2, 2), Layout::ColMajor),
        Ordering::Equal
    );
}

#[test]
fn test_global_order_without_extents_is_cell_order() {
    let schema = schema_4x4(false);
    let cells = sorted(&schema, vec![(2, 1), (1, 3), (1, 1), (2, 4)]);
    assert_eq!(cells, vec![(1, 1), (1, 3), (2, 1), (2, 4)]);
}

#[test]
fn test_global_order_visits_tiles_first() {
    let schema = schema_4x4(true);
    let cells = sorted(&schema, vec![(1, 3), (2, 2), (1, 1), (3, 1), (2, 1), (1, 2)]);

    // Tile (0,0) holds rows 1-2 / cols 1-2, tile (0,1) cols 3-4, tile (1,0) rows 3-4
    assert_eq!(cells, vec![(1, 1), (1, 2), (2, 1), (2, 2), (1, 3), (3, 1)]);
}

// =============================================================================
// Rectangle Tests
// =============================================================================

#[test]
fn test_validate_subarray() {
    let schema = schema_4x4(false);

    assert!(schema.validate_subarray(&encode_values(&[1i32, 4, 2, 3])).is_ok());
    assert!(matches!(
        schema.validate_subarray(&encode_values(&[0i32, 4, 1, 4])),
        Err(MosaicError::Query(_))
    ));
    assert!(matches!(
        schema.validate_subarray(&encode_values(&[3i32, 2, 1, 4])),
        Err(MosaicError::Query(_))
    ));
    assert!(matches!(
        schema.validate_subarray(&encode_values(&[1i32, 4])),
        Err(MosaicError::Query(_))
    ));
}

#[test]
fn test_rect_predicates() {
    let schema = schema_4x4(false);
    let rect = encode_values(&[2i32, 3, 2, 3]);

    assert!(schema.coords_in_rect(&c(2, 3), &rect));
    assert!(!schema.coords_in_rect(&c(1, 3), &rect));

    assert!(schema.rects_overlap(&rect, &encode_values(&[3i32, 4, 1, 2])));
    assert!(!schema.rects_overlap(&rect, &encode_values(&[4i32, 4, 1, 4])));
}

#[test]
fn test_cell_num_in_rect() {
    let schema = schema_4x4(false);
    assert_eq!(schema.cell_num_in_rect(&encode_values(&[1i32, 4, 2, 3])).unwrap(), 8);
    assert_eq!(schema.cell_num_in_rect(&schema.domain()).unwrap(), 16);
}
