//! Error types for MosaicDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using MosaicError
pub type Result<T> = std::result::Result<T, MosaicError>;

/// Unified error type for MosaicDB operations
#[derive(Debug, Error)]
pub enum MosaicError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A filesystem collaborator operation failed
    #[error("VFS error: {0}")]
    Vfs(String),

    // -------------------------------------------------------------------------
    // Schema / Query Errors
    // -------------------------------------------------------------------------
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Query error: {0}")]
    Query(String),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    #[error("Allocation error: {0}")]
    Allocation(String),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    /// Malformed stored data: bad checksum, truncated tile, broken offsets
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A tile payload could not be compressed or decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for MosaicError {
    fn from(e: bincode::Error) -> Self {
        MosaicError::Serialization(e.to_string())
    }
}
