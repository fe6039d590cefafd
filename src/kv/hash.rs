//! Key digest coordinates
//!
//! A key is canonicalized as `type tag (u8) ++ byte length (u64 LE) ++ bytes`
//! and hashed with MD5. The two little-endian 64-bit halves of the digest
//! are the key's coordinates in the two-dimensional key space.
//!
//! Distinct keys with equal digests land on the same cell and cannot be told
//! apart; no collision handling is performed.

use md5::{Digest, Md5};

use crate::datatype::{read_u64, Datatype};

/// Coordinates of a key in the key-value array
pub fn key_coords(datatype: Datatype, key: &[u8]) -> [u64; 2] {
    let mut hasher = Md5::new();
    hasher.update([datatype as u8]);
    hasher.update((key.len() as u64).to_le_bytes());
    hasher.update(key);
    let digest = hasher.finalize();

    [read_u64(&digest[0..8]), read_u64(&digest[8..16])]
}
