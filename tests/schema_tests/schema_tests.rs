//! Tests for schema building and persistence
//!
//! These tests verify:
//! - Validation of names, types, domains, orders and capacity
//! - Attribute id lookups, including the coordinates pseudo-attribute
//! - Key-value schemas get their reserved dimensions and attributes
//! - Schemas survive a store/load cycle and detect corruption

use std::sync::Arc;

use mosaicdb::constants::{ARRAY_SCHEMA_FILENAME, COORDS, KEY_ATTR_NAME, KEY_TYPE_ATTR_NAME};
use mosaicdb::vfs::{self, Vfs};
use mosaicdb::{
    ArraySchema, ArrayType, Attribute, Compressor, Config, Datatype, Dimension, Layout, LocalFs, MemFs,
    MosaicError, StorageManager,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn dense_2d() -> ArraySchema {
    ArraySchema::builder(ArrayType::Dense)
        .attribute(Attribute::new("a1", Datatype::Int32))
        .attribute(Attribute::var("a2", Datatype::Char))
        .dimension(Dimension::new("rows", 1i64, 4).with_tile_extent(2i64))
        .dimension(Dimension::new("cols", 1i64, 4).with_tile_extent(2i64))
        .build()
        .unwrap()
}

fn assert_schema_error(result: mosaicdb::Result<ArraySchema>) {
    assert!(matches!(result, Err(MosaicError::Schema(_))));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_valid_dense_schema() {
    let schema = dense_2d();

    assert!(schema.dense());
    assert!(!schema.is_kv());
    assert_eq!(schema.attribute_num(), 2);
    assert_eq!(schema.dim_num(), 2);
    assert_eq!(schema.coords_type(), Datatype::Int64);
    assert_eq!(schema.coords_size(), 16);
    assert!(schema.has_tile_extents());
}

#[test]
fn test_requires_attribute_and_dimension() {
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .dimension(Dimension::new("d", 0i32, 10))
            .build(),
    );
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("a", Datatype::Int32))
            .build(),
    );
}

#[test]
fn test_rejects_bad_names() {
    // Duplicate across attributes and dimensions
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("x", Datatype::Int32))
            .dimension(Dimension::new("x", 0i32, 10))
            .build(),
    );
    // Reserved
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new(COORDS, Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10))
            .build(),
    );
    // Empty
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("", Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10))
            .build(),
    );
    // Too long
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .name_max_len(4)
            .attribute(Attribute::new("abcdefgh", Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10))
            .build(),
    );
}

#[test]
fn test_rejects_bad_dimensions() {
    // Mixed types
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d1", 0i32, 10))
            .dimension(Dimension::new("d2", 0i64, 10))
            .build(),
    );
    // lo > hi
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 10i32, 0))
            .build(),
    );
    // Non-positive extent
    assert_schema_error(
        ArraySchema::builder(ArrayType::Dense)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10).with_tile_extent(0i32))
            .build(),
    );
    // Extent wider than the domain
    assert_schema_error(
        ArraySchema::builder(ArrayType::Dense)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10).with_tile_extent(12i32))
            .build(),
    );
    assert_schema_error(
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("x", 0.0f64, 1.0).with_tile_extent(1.5f64))
            .build(),
    );
}

#[test]
fn test_extent_spanning_whole_domain_accepted() {
    let schema = ArraySchema::builder(ArrayType::Dense)
        .attribute(Attribute::new("a", Datatype::Int32))
        .dimension(Dimension::new("d", 0i32, 10).with_tile_extent(11i32))
        .build()
        .unwrap();
    assert!(schema.has_tile_extents());

    let full = ArraySchema::builder(ArrayType::Dense)
        .attribute(Attribute::new("a", Datatype::Int64))
        .dimension(Dimension::new("d", i64::MIN, i64::MAX).with_tile_extent(i64::MAX))
        .build();
    assert!(full.is_ok());
}

#[test]
fn test_dense_requires_integer_coordinates() {
    assert_schema_error(
        ArraySchema::builder(ArrayType::Dense)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 0.0f64, 1.0))
            .build(),
    );
    assert_schema_error(
        ArraySchema::builder(ArrayType::Dense)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 0u64, 10))
            .build(),
    );

    // Sparse arrays may use real coordinates
    let sparse = ArraySchema::builder(ArrayType::Sparse)
        .attribute(Attribute::new("a", Datatype::Int32))
        .dimension(Dimension::new("d", 0.0f64, 1.0))
        .build()
        .unwrap();
    assert_eq!(sparse.coords_type(), Datatype::Float64);
}

#[test]
fn test_rejects_bad_orders_and_capacity() {
    let base = || {
        ArraySchema::builder(ArrayType::Sparse)
            .attribute(Attribute::new("a", Datatype::Int32))
            .dimension(Dimension::new("d", 0i32, 10))
    };

    assert_schema_error(base().cell_order(Layout::GlobalOrder).build());
    assert_schema_error(base().tile_order(Layout::Unordered).build());
    assert_schema_error(base().capacity(0).build());
    assert_schema_error(
        base()
            .attribute(Attribute::new("b", Datatype::Int32).with_cell_val_num(0))
            .build(),
    );
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_attribute_lookups() {
    let schema = dense_2d();

    assert_eq!(schema.attribute_id("a1").unwrap(), 0);
    assert_eq!(schema.attribute_id("a2").unwrap(), 1);
    assert_eq!(schema.attribute_id(COORDS).unwrap(), schema.coords_id());
    assert!(schema.attribute_id("missing").is_err());

    assert_eq!(schema.attribute_names(), vec!["a1", "a2", COORDS]);
    assert_eq!(schema.attribute_name(schema.coords_id()), COORDS);

    assert_eq!(schema.cell_size(0), Some(4));
    assert_eq!(schema.cell_size(1), None);
    assert_eq!(schema.cell_size(schema.coords_id()), Some(16));
    assert!(schema.var_size(1));
    assert_eq!(schema.cell_val_num(schema.coords_id()), 2);
}

#[test]
fn test_display_dump() {
    let dump = dense_2d().to_string();

    assert!(dump.contains("- Array type: dense"));
    assert!(dump.contains("- Cell order: row-major"));
    assert!(dump.contains("### Attribute ###"));
    assert!(dump.contains("- Name: a2"));
    assert!(dump.contains("- Cell val num: var"));
    assert!(dump.contains("### Dimension ###"));
    assert!(dump.contains("- Domain: [1, 4]"));
    assert!(dump.contains("- Tile extent: 2"));
    assert!(dump.contains("- Compressor: NO_COMPRESSION"));
    assert!(dump.contains("- Coordinates compressor: NO_COMPRESSION"));
}

#[test]
fn test_display_dump_lists_compressors() {
    let schema = ArraySchema::builder(ArrayType::Sparse)
        .attribute(Attribute::new("a1", Datatype::Int32).with_compressor(Compressor::Zstd, 5))
        .dimension(Dimension::new("d", 0i32, 10))
        .coords_compressor(Compressor::Lz4, -1)
        .build()
        .unwrap();
    let dump = schema.to_string();

    assert!(dump.contains("- Compressor: ZSTD"));
    assert!(dump.contains("- Compression level: 5"));
    assert!(dump.contains("- Coordinates compressor: LZ4"));
    assert_eq!(schema.compression(0), (Compressor::Zstd, 5));
    assert_eq!(schema.compression(schema.coords_id()), (Compressor::Lz4, -1));
}

#[test]
fn test_key_value_schema() {
    let schema = ArraySchema::kv(vec![Attribute::new("value", Datatype::Float32)]).unwrap();

    assert!(schema.is_kv());
    assert!(!schema.dense());
    assert_eq!(schema.dim_num(), 2);
    assert_eq!(schema.coords_type(), Datatype::UInt64);
    assert!(schema.attribute_id(KEY_ATTR_NAME).is_ok());
    assert_eq!(
        schema.datatype(schema.attribute_id(KEY_TYPE_ATTR_NAME).unwrap()),
        Datatype::UInt8
    );
}

#[test]
fn test_key_value_rejects_reserved_attribute() {
    let result = ArraySchema::kv(vec![Attribute::new(KEY_ATTR_NAME, Datatype::Int32)]);
    assert!(matches!(result, Err(MosaicError::Schema(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_schema_persists_across_managers() {
    let vfs: Arc<dyn Vfs> = Arc::new(MemFs::new());
    let schema = dense_2d();

    let first = StorageManager::new(Arc::clone(&vfs), Config::default());
    first.array_create("mem://arrays/dense", &schema).unwrap();

    let second = StorageManager::new(vfs, Config::default());
    let array = second.array_open("mem://arrays/dense").unwrap();
    assert_eq!(array.schema(), &schema);
}

#[test]
fn test_create_existing_array_fails() {
    let manager = StorageManager::in_memory(Config::default());
    manager.array_create("mem://a", &dense_2d()).unwrap();

    let result = manager.array_create("mem://a", &dense_2d());
    assert!(matches!(result, Err(MosaicError::Schema(_))));
}

#[test]
fn test_open_missing_array_fails() {
    let manager = StorageManager::in_memory(Config::default());
    assert!(matches!(
        manager.array_open("mem://nothing"),
        Err(MosaicError::Schema(_))
    ));
}

#[test]
fn test_corrupted_schema_detected() {
    let temp = TempDir::new().unwrap();
    let uri = temp.path().join("array").to_string_lossy().into_owned();

    StorageManager::local(Config::default())
        .array_create(&uri, &dense_2d())
        .unwrap();

    // Flip one byte in the middle of the schema file
    let path = temp.path().join("array").join(ARRAY_SCHEMA_FILENAME);
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let result = StorageManager::local(Config::default()).array_open(&uri);
    assert!(matches!(result, Err(MosaicError::Corruption(_))));
}

#[test]
fn test_delete_array() {
    let local = LocalFs::default();
    let temp = TempDir::new().unwrap();
    let uri = vfs::join(&temp.path().to_string_lossy(), "gone");

    let manager = StorageManager::local(Config::default());
    manager.array_create(&uri, &dense_2d()).unwrap();
    assert!(local.is_dir(&uri));

    manager.array_delete(&uri).unwrap();
    assert!(!local.is_dir(&uri));
    assert!(!manager.is_array(&uri));
    assert!(manager.array_open(&uri).is_err());
}
