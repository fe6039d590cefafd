//! Virtual Filesystem Module
//!
//! The narrow byte-range contract through which every other layer reaches
//! storage. Fragments and schemas never touch `std::fs` directly.
//!
//! ## Contract
//! - All paths are scheme-qualified URIs (`file:///tmp/a`, `mem://a`);
//!   bare paths are treated as local.
//! - `write_to_file` appends when the target exists and creates it otherwise.
//! - `list` returns full child URIs, one level deep, in no particular order.
//! - Every failure is reported as [`MosaicError::Vfs`] carrying a readable
//!   message.
//!
//! [`MosaicError::Vfs`]: crate::error::MosaicError::Vfs

mod local;
mod mem;

use std::fmt::Debug;

use crate::error::Result;

pub use local::LocalFs;
pub use mem::MemFs;

/// Filesystem collaborator consumed by the storage engine
pub trait Vfs: Debug + Send + Sync {
    fn create_dir(&self, uri: &str) -> Result<()>;

    /// Delete a directory and everything below it
    fn delete_dir(&self, uri: &str) -> Result<()>;

    /// Rename a directory (used to publish finalized fragments)
    fn move_dir(&self, from: &str, to: &str) -> Result<()>;

    fn is_dir(&self, uri: &str) -> bool;

    /// Create an empty file
    fn create_file(&self, uri: &str) -> Result<()>;

    fn delete_file(&self, uri: &str) -> Result<()>;

    fn is_file(&self, uri: &str) -> bool;

    /// Fill `buffer` with `buffer.len()` bytes starting at `offset`
    fn read_from_file(&self, uri: &str, offset: u64, buffer: &mut [u8]) -> Result<()>;

    /// Append `buffer` to the file, creating it if needed
    fn write_to_file(&self, uri: &str, buffer: &[u8]) -> Result<()>;

    /// Child URIs of a directory
    fn list(&self, uri: &str) -> Result<Vec<String>>;

    fn file_size(&self, uri: &str) -> Result<u64>;

    /// Read a whole file into memory
    fn read_all(&self, uri: &str) -> Result<Vec<u8>> {
        let size = self.file_size(uri)? as usize;
        let mut buffer = vec![0u8; size];
        self.read_from_file(uri, 0, &mut buffer)?;
        Ok(buffer)
    }
}

// =============================================================================
// URI Helpers
// =============================================================================

/// Join a child name onto a directory URI
pub fn join(base: &str, child: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, child)
    } else {
        format!("{}/{}", base, child)
    }
}

/// Last path component of a URI
pub fn last_component(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}

/// Strip a `scheme://` prefix, if any
pub fn strip_scheme(uri: &str) -> &str {
    match uri.find("://") {
        Some(idx) => &uri[idx + 3..],
        None => uri,
    }
}
