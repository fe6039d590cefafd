//! Tests for coordinate tile MBRs and bounding coordinates
//!
//! These tests verify:
//! - The MBR covers every appended tuple, for 1 to 5 dimensions
//! - Bounding coordinates are the first and last appended tuples
//! - Reloading a payload rebuilds the same summary

use mosaicdb::datatype::{decode_values, encode_values};
use mosaicdb::tile::TileType;
use mosaicdb::{Datatype, Tile};

// =============================================================================
// Helper Functions
// =============================================================================

/// Small deterministic xorshift generator
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn coord(&mut self) -> i64 {
        (self.next() % 2001) as i64 - 1000
    }
}

fn random_tuples(rng: &mut XorShift, dim_num: usize, n: usize) -> Vec<Vec<i64>> {
    (0..n)
        .map(|_| (0..dim_num).map(|_| rng.coord()).collect())
        .collect()
}

fn expected_mbr(tuples: &[Vec<i64>], dim_num: usize) -> Vec<i64> {
    let mut mbr = Vec::with_capacity(2 * dim_num);
    for d in 0..dim_num {
        mbr.push(tuples.iter().map(|t| t[d]).min().unwrap());
        mbr.push(tuples.iter().map(|t| t[d]).max().unwrap());
    }
    mbr
}

// =============================================================================
// MBR Tests
// =============================================================================

#[test]
fn test_mbr_covers_random_tuples() {
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);

    for dim_num in 1..=5 {
        for round in 0..10 {
            let tuples = random_tuples(&mut rng, dim_num, 1 + round * 7);
            let mut tile = Tile::coordinate(0, Datatype::Int64, dim_num);
            for t in &tuples {
                tile.append_cell(&encode_values(t)).unwrap();
            }

            let mbr: Vec<i64> = decode_values(tile.mbr().unwrap());
            assert_eq!(mbr, expected_mbr(&tuples, dim_num), "dims = {}", dim_num);
            assert_eq!(tile.cell_num(), tuples.len() as u64);
        }
    }
}

#[test]
fn test_bounding_coordinates_first_and_last() {
    let mut tile = Tile::coordinate(3, Datatype::Int32, 2);
    for t in [[5i32, 1], [2, 9], [7, 7]] {
        tile.append_cell(&encode_values(&t)).unwrap();
    }

    let (first, last) = tile.bounding_coordinates().unwrap();
    assert_eq!(decode_values::<i32>(first), vec![5, 1]);
    assert_eq!(decode_values::<i32>(last), vec![7, 7]);
    assert_eq!(decode_values::<i32>(tile.mbr().unwrap()), vec![2, 7, 1, 9]);
}

#[test]
fn test_set_payload_rebuilds_summary() {
    let mut rng = XorShift(42);
    let tuples = random_tuples(&mut rng, 3, 25);

    let mut appended = Tile::coordinate(0, Datatype::Int64, 3);
    let mut payload = Vec::new();
    for t in &tuples {
        appended.append_cell(&encode_values(t)).unwrap();
        payload.extend_from_slice(&encode_values(t));
    }

    let mut loaded = Tile::coordinate(0, Datatype::Int64, 3);
    loaded.set_payload(&payload).unwrap();

    assert_eq!(loaded.cell_num(), 25);
    assert_eq!(loaded.mbr(), appended.mbr());
    assert_eq!(loaded.bounding_coordinates(), appended.bounding_coordinates());
}

#[test]
fn test_attribute_tile_has_no_mbr() {
    let mut tile = Tile::attribute(0, Datatype::Int32, 1);
    tile.append_cell(&encode_values(&[10i32])).unwrap();

    assert_eq!(tile.tile_type(), TileType::Attribute);
    assert!(tile.mbr().is_none());
    assert!(tile.bounding_coordinates().is_none());
}

#[test]
fn test_clear_resets_summary() {
    let mut tile = Tile::coordinate(0, Datatype::Float64, 2);
    tile.append_cell(&encode_values(&[0.5f64, -1.5])).unwrap();
    tile.clear();

    assert!(tile.is_empty());
    assert!(tile.mbr().is_none());
    assert_eq!(tile.tile_size(), 0);
}

#[test]
fn test_append_rejects_wrong_cell_size() {
    let mut tile = Tile::coordinate(0, Datatype::Int32, 2);
    assert!(tile.append_cell(&encode_values(&[1i32])).is_err());
    assert!(tile.is_empty());
}
