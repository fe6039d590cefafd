//! # MosaicDB
//!
//! An embeddable array storage engine with:
//! - Dense and sparse multi-dimensional arrays of typed attributes
//! - Immutable, append-only fragments published by an atomic rename
//! - Tiled storage with per-tile bounding rectangles for pruning
//! - Per-attribute tile compression (zstd, lz4)
//! - Global-order, row-major, column-major and unordered queries
//! - A key-value layer that hashes keys onto a sparse 2-D array
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StorageManager                          │
//! │            (create / open / delete arrays, KV stores)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Array (schema + vfs)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │              Query / KvQuery  (buffers, status)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Read State │          │  Fragment   │
//!   │  (merge)    │◄─────────│  (tiles)    │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │     VFS     │
//!                           │ (local/mem) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod constants;
pub mod datatype;
pub mod error;

pub mod fragment;
pub mod kv;
pub mod query;
pub mod schema;
pub mod storage;
pub mod tile;
pub mod vfs;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use datatype::{CellValue, Datatype};
pub use error::{MosaicError, Result};
pub use kv::{Keys, KvQuery};
pub use query::{Query, QueryBuffer, QueryBuilder, QueryMode, QueryStatus, QueryType};
pub use schema::{ArraySchema, ArrayType, Attribute, Dimension, Layout};
pub use storage::{Array, StorageManager};
pub use tile::{Compressor, Tile};
pub use vfs::{LocalFs, MemFs, Vfs};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of MosaicDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
