//! Key container
//!
//! Three parallel, append-only sequences:
//! ```text
//! offsets:  [0,        4,             9]
//! keys_var: [k0 bytes][k1 bytes.....][k2 bytes...]
//! types:    [INT32,    CHAR,          FLOAT64]
//! ```
//! Key `i` spans `keys_var[offsets[i]..offsets[i + 1]]`, the last one runs to
//! the end of the blob.

use bytes::BytesMut;

use crate::datatype::{CellValue, Datatype};
use crate::error::{MosaicError, Result};

/// Keys handed to a key-value query
#[derive(Debug, Clone, Default)]
pub struct Keys {
    offsets: Vec<u64>,
    keys_var: BytesMut,
    types: Vec<Datatype>,
}

impl Keys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one key given as raw bytes of `datatype`
    pub fn add_key(&mut self, key: &[u8], datatype: Datatype) -> Result<()> {
        if key.is_empty() {
            return Err(MosaicError::Query("Keys cannot be empty".to_string()));
        }
        if key.len() % datatype.size() != 0 {
            return Err(MosaicError::Query(format!(
                "Key of {} bytes is not a whole number of {} values",
                key.len(),
                datatype
            )));
        }
        self.offsets.push(self.keys_var.len() as u64);
        self.keys_var.extend_from_slice(key);
        self.types.push(datatype);
        Ok(())
    }

    /// Append a numeric key
    pub fn add<T: CellValue>(&mut self, key: T) -> Result<()> {
        let mut bytes = Vec::with_capacity(T::SIZE);
        key.write_le(&mut bytes);
        self.add_key(&bytes, T::DATATYPE)
    }

    /// Append a string key (`Char`)
    pub fn add_str(&mut self, key: &str) -> Result<()> {
        self.add_key(key.as_bytes(), Datatype::Char)
    }

    pub fn key_num(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn keys_var(&self) -> &[u8] {
        &self.keys_var
    }

    pub fn types(&self) -> &[Datatype] {
        &self.types
    }

    /// Bytes of the offsets sequence
    pub fn offsets_size(&self) -> usize {
        self.offsets.len() * std::mem::size_of::<u64>()
    }

    pub fn keys_var_size(&self) -> usize {
        self.keys_var.len()
    }

    /// Key `i` as (type, bytes)
    pub fn key(&self, i: usize) -> Option<(Datatype, &[u8])> {
        let start = *self.offsets.get(i)? as usize;
        let end = self
            .offsets
            .get(i + 1)
            .map(|&o| o as usize)
            .unwrap_or(self.keys_var.len());
        Some((self.types[i], &self.keys_var[start..end]))
    }

    /// Every key in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (Datatype, &[u8])> + '_ {
        (0..self.key_num()).filter_map(move |i| self.key(i))
    }
}
