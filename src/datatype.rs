//! Cell datatypes
//!
//! The engine stores every payload as raw little-endian bytes tagged with a
//! [`Datatype`]. The fixed set of supported types is described by a table of
//! (size, ordering, sentinels) exposed through the [`CellValue`] trait, and
//! type-erased code reaches the typed implementation through
//! [`dispatch_datatype!`].
//!
//! ## Sentinels
//! ```text
//! ┌──────────┬──────────────┬────────────────┐
//! │ Type     │ Empty (null) │ Deletion       │
//! ├──────────┼──────────────┼────────────────┤
//! │ integers │ T::MAX       │ T::MAX - 1     │
//! │ floats   │ T::MAX       │ T::MIN         │
//! │ char     │ i8::MAX      │ i8::MAX - 1    │
//! └──────────┴──────────────┴────────────────┘
//! ```
//! The sentinel values are reserved: user data cannot represent them.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported cell types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Datatype {
    Int32 = 0,
    Int64 = 1,
    Float32 = 2,
    Float64 = 3,
    Char = 4,
    Int8 = 5,
    UInt8 = 6,
    Int16 = 7,
    UInt16 = 8,
    UInt32 = 9,
    UInt64 = 10,
}

impl Datatype {
    /// Size of one value of this type in bytes
    pub fn size(&self) -> usize {
        match self {
            Datatype::Int8 | Datatype::UInt8 | Datatype::Char => 1,
            Datatype::Int16 | Datatype::UInt16 => 2,
            Datatype::Int32 | Datatype::UInt32 | Datatype::Float32 => 4,
            Datatype::Int64 | Datatype::UInt64 | Datatype::Float64 => 8,
        }
    }

    /// Upper-case name used in schema dumps
    pub fn name(&self) -> &'static str {
        match self {
            Datatype::Int32 => "INT32",
            Datatype::Int64 => "INT64",
            Datatype::Float32 => "FLOAT32",
            Datatype::Float64 => "FLOAT64",
            Datatype::Char => "CHAR",
            Datatype::Int8 => "INT8",
            Datatype::UInt8 => "UINT8",
            Datatype::Int16 => "INT16",
            Datatype::UInt16 => "UINT16",
            Datatype::UInt32 => "UINT32",
            Datatype::UInt64 => "UINT64",
        }
    }

    /// Decode a one-byte type tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Datatype::Int32,
            1 => Datatype::Int64,
            2 => Datatype::Float32,
            3 => Datatype::Float64,
            4 => Datatype::Char,
            5 => Datatype::Int8,
            6 => Datatype::UInt8,
            7 => Datatype::Int16,
            8 => Datatype::UInt16,
            9 => Datatype::UInt32,
            10 => Datatype::UInt64,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Datatype::Float32 | Datatype::Float64 | Datatype::Char)
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Datatype::Float32 | Datatype::Float64)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Typed Values
// =============================================================================

/// A primitive value that can live in a tile payload
pub trait CellValue: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const DATATYPE: Datatype;
    const SIZE: usize;
    /// Reserved "empty" (null) value
    const EMPTY: Self;
    /// Reserved deletion (tombstone) value
    const DEL: Self;

    /// Read one value from the first `SIZE` bytes of `bytes`
    fn read_le(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of `self`
    fn write_le(self, out: &mut Vec<u8>);

    /// Lossless conversion to i64 (integers that fit only)
    fn to_i64(self) -> Option<i64>;

    /// Conversion from i64 used when materializing dense coordinates
    fn from_i64(value: i64) -> Self;

    /// Index of the space tile holding `self`, given the domain lower bound
    /// and the tile extent of the dimension
    fn tile_index(self, lo: Self, extent: Self) -> u64;

    /// True if a tile extent of `self` is no larger than the domain `[lo, hi]`
    fn extent_fits(self, lo: Self, hi: Self) -> bool;
}

macro_rules! impl_int_cell_value {
    ($t:ty, $dt:expr) => {
        impl CellValue for $t {
            const DATATYPE: Datatype = $dt;
            const SIZE: usize = std::mem::size_of::<$t>();
            const EMPTY: Self = <$t>::MAX;
            const DEL: Self = <$t>::MAX - 1;

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn to_i64(self) -> Option<i64> {
                i64::try_from(self).ok()
            }

            fn from_i64(value: i64) -> Self {
                value as $t
            }

            fn tile_index(self, lo: Self, extent: Self) -> u64 {
                let extent = (extent as i128).max(1);
                ((self as i128 - lo as i128) / extent) as u64
            }

            fn extent_fits(self, lo: Self, hi: Self) -> bool {
                (self as i128) <= hi as i128 - lo as i128 + 1
            }
        }
    };
}

macro_rules! impl_real_cell_value {
    ($t:ty, $dt:expr) => {
        impl CellValue for $t {
            const DATATYPE: Datatype = $dt;
            const SIZE: usize = std::mem::size_of::<$t>();
            const EMPTY: Self = <$t>::MAX;
            const DEL: Self = <$t>::MIN;

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn to_i64(self) -> Option<i64> {
                None
            }

            fn from_i64(value: i64) -> Self {
                value as $t
            }

            fn tile_index(self, lo: Self, extent: Self) -> u64 {
                ((self - lo) / extent).floor() as u64
            }

            fn extent_fits(self, lo: Self, hi: Self) -> bool {
                self <= hi - lo
            }
        }
    };
}

impl_int_cell_value!(i8, Datatype::Int8);
impl_int_cell_value!(u8, Datatype::UInt8);
impl_int_cell_value!(i16, Datatype::Int16);
impl_int_cell_value!(u16, Datatype::UInt16);
impl_int_cell_value!(i32, Datatype::Int32);
impl_int_cell_value!(u32, Datatype::UInt32);
impl_int_cell_value!(i64, Datatype::Int64);
impl_int_cell_value!(u64, Datatype::UInt64);
impl_real_cell_value!(f32, Datatype::Float32);
impl_real_cell_value!(f64, Datatype::Float64);

/// Run `$body` with `$T` aliased to the Rust type behind a [`Datatype`].
///
/// `Char` maps to `i8`.
macro_rules! dispatch_datatype {
    ($datatype:expr, $T:ident => $body:expr) => {{
        use $crate::datatype::Datatype as __Dt;
        match $datatype {
            __Dt::Int8 | __Dt::Char => {
                type $T = i8;
                $body
            }
            __Dt::UInt8 => {
                type $T = u8;
                $body
            }
            __Dt::Int16 => {
                type $T = i16;
                $body
            }
            __Dt::UInt16 => {
                type $T = u16;
                $body
            }
            __Dt::Int32 => {
                type $T = i32;
                $body
            }
            __Dt::UInt32 => {
                type $T = u32;
                $body
            }
            __Dt::Int64 => {
                type $T = i64;
                $body
            }
            __Dt::UInt64 => {
                type $T = u64;
                $body
            }
            __Dt::Float32 => {
                type $T = f32;
                $body
            }
            __Dt::Float64 => {
                type $T = f64;
                $body
            }
        }
    }};
}
pub(crate) use dispatch_datatype;

// =============================================================================
// Byte Helpers
// =============================================================================

/// Encode a slice of typed values into little-endian bytes
pub fn encode_values<T: CellValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for v in values {
        v.write_le(&mut out);
    }
    out
}

/// Decode little-endian bytes into typed values (trailing partial values are ignored)
pub fn decode_values<T: CellValue>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::read_le).collect()
}

/// Encoding of the empty (null) sentinel for `datatype`
pub fn empty_value(datatype: Datatype) -> Vec<u8> {
    dispatch_datatype!(datatype, T => encode_values::<T>(&[T::EMPTY]))
}

/// Encoding of the deletion sentinel for `datatype`
pub fn del_value(datatype: Datatype) -> Vec<u8> {
    dispatch_datatype!(datatype, T => encode_values::<T>(&[T::DEL]))
}

/// Compare two encoded values of the same type
pub(crate) fn cmp_value(datatype: Datatype, a: &[u8], b: &[u8]) -> Ordering {
    dispatch_datatype!(datatype, T => {
        T::read_le(a).partial_cmp(&T::read_le(b)).unwrap_or(Ordering::Equal)
    })
}

/// Read a little-endian u64 from the first 8 bytes of `bytes`
pub(crate) fn read_u64(bytes: &[u8]) -> u64 {
    u64::read_le(bytes)
}
