//! Tests for configuration building and validation
//!
//! These tests verify:
//! - Defaults are valid and the builder applies every setting
//! - Zero sizes and capacities are rejected with a configuration error

use mosaicdb::{Config, MosaicError};

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert!(config.verify_checksums);
    assert!(config.sort_slab_cells > 0);
}

#[test]
fn test_builder_applies_settings() {
    let config = Config::builder()
        .max_write_bytes(64)
        .verify_checksums(false)
        .name_max_len(32)
        .default_capacity(500)
        .tile_cache_capacity(8)
        .sort_slab_cells(100)
        .build()
        .unwrap();

    assert_eq!(config.max_write_bytes, 64);
    assert!(!config.verify_checksums);
    assert_eq!(config.name_max_len, 32);
    assert_eq!(config.default_capacity, 500);
    assert_eq!(config.tile_cache_capacity, 8);
    assert_eq!(config.sort_slab_cells, 100);
}

#[test]
fn test_zero_values_rejected() {
    let builders = [
        Config::builder().max_write_bytes(0),
        Config::builder().name_max_len(0),
        Config::builder().default_capacity(0),
        Config::builder().tile_cache_capacity(0),
        Config::builder().sort_slab_cells(0),
    ];
    for builder in builders {
        assert!(matches!(builder.build(), Err(MosaicError::Config(_))));
    }
}

#[test]
fn test_validate_reports_field() {
    let config = Config {
        tile_cache_capacity: 0,
        ..Config::default()
    };
    match config.validate() {
        Err(MosaicError::Config(msg)) => assert!(msg.contains("tile_cache_capacity")),
        other => panic!("expected a configuration error, got {:?}", other),
    }
}
