//! Key-Value Module
//!
//! Point and bulk key-value access on top of sparse arrays.
//!
//! ## Key Space
//! ```text
//!   key ──► (type, len, bytes) ──► MD5 ──► [h0 | h1]
//!                                            │    │
//!                         __key_dim_1 ◄──────┘    └──────► __key_dim_2
//! ```
//! Every key becomes one cell of a sparse array with two `UInt64` dimensions.
//! The key itself and its type are stored in the reserved `__key` and
//! `__key_type` attributes next to the user attributes.

mod hash;
mod keys;
mod query;

pub use hash::key_coords;
pub use keys::Keys;
pub use query::{KvQuery, KvQueryBuilder};
