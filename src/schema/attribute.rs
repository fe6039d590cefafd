//! Attribute declarations

use serde::{Deserialize, Serialize};

use crate::constants::VAR_NUM;
use crate::datatype::Datatype;
use crate::tile::{Compressor, DEFAULT_COMPRESSION_LEVEL};

/// One attribute of an array: a name, a cell type and a value count per cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    datatype: Datatype,
    /// Values per cell, or [`VAR_NUM`] for variable-sized cells
    cell_val_num: u32,
    compressor: Compressor,
    compression_level: i32,
}

impl Attribute {
    /// Fixed-size attribute holding one value per cell
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: 1,
            compressor: Compressor::NoCompression,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Variable-sized attribute
    pub fn var(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: VAR_NUM,
            compressor: Compressor::NoCompression,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Set the number of values per cell
    pub fn with_cell_val_num(mut self, cell_val_num: u32) -> Self {
        self.cell_val_num = cell_val_num;
        self
    }

    /// Compress this attribute's tiles with `compressor` at `level`
    /// (`-1` for the compressor's default)
    pub fn with_compressor(mut self, compressor: Compressor, level: i32) -> Self {
        self.compressor = compressor;
        self.compression_level = level;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn cell_val_num(&self) -> u32 {
        self.cell_val_num
    }

    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    pub fn var_size(&self) -> bool {
        self.cell_val_num == VAR_NUM
    }

    /// Cell size in bytes, `None` for variable-sized cells
    pub fn cell_size(&self) -> Option<usize> {
        if self.var_size() {
            None
        } else {
            Some(self.cell_val_num as usize * self.datatype.size())
        }
    }
}
