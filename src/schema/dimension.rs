//! Dimension declarations

use serde::{Deserialize, Serialize};

use crate::datatype::{dispatch_datatype, encode_values, CellValue, Datatype};

/// One dimension of the array domain
///
/// The domain and tile extent are stored encoded in the dimension's type so
/// the schema stays type-erased like every other payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
    datatype: Datatype,
    /// `[lo, hi]`, both inclusive
    domain: Vec<u8>,
    tile_extent: Option<Vec<u8>>,
}

impl Dimension {
    pub fn new<T: CellValue>(name: impl Into<String>, lo: T, hi: T) -> Self {
        Self {
            name: name.into(),
            datatype: T::DATATYPE,
            domain: encode_values(&[lo, hi]),
            tile_extent: None,
        }
    }

    /// Set the space tile extent along this dimension
    pub fn with_tile_extent<T: CellValue>(mut self, extent: T) -> Self {
        self.tile_extent = Some(encode_values(&[extent]));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Encoded `[lo, hi]`
    pub fn domain(&self) -> &[u8] {
        &self.domain
    }

    pub fn tile_extent(&self) -> Option<&[u8]> {
        self.tile_extent.as_deref()
    }

    /// Human-readable domain, e.g. `[1, 4]`
    pub fn domain_string(&self) -> String {
        dispatch_datatype!(self.datatype, T => {
            let lo = T::read_le(&self.domain);
            let hi = T::read_le(&self.domain[T::SIZE..]);
            format!("[{:?}, {:?}]", lo, hi)
        })
    }

    pub(crate) fn tile_extent_string(&self) -> String {
        match &self.tile_extent {
            Some(bytes) => dispatch_datatype!(self.datatype, T => format!("{:?}", T::read_le(bytes))),
            None => "null".to_string(),
        }
    }
}
