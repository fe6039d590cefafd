//! Storage Module
//!
//! Array-level persistence: schema files, array handles and fragment
//! discovery.
//!
//! ## Array Directory
//! ```text
//! <array_uri>/
//! ├── __array_schema.mdb          schema (see codec for framing)
//! ├── __<fragment>/               finalized fragments, oldest first
//! ├── __<fragment>/
//! └── .__<fragment>/              write in progress, invisible to readers
//! ```

mod array;
pub(crate) mod codec;
mod manager;

pub use array::Array;
pub use manager::StorageManager;
