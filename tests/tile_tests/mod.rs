//! Tests for Tile: appends, MBRs, iteration and sentinels

mod mbr_tests;
