//! Local filesystem backend
//!
//! Maps `file://` (or bare) URIs onto `std::fs`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{MosaicError, Result};

use super::Vfs;

/// Local disk implementation of [`Vfs`]
#[derive(Debug, Clone)]
pub struct LocalFs {
    /// Appends larger than this are split into several write calls
    max_write_bytes: usize,
}

impl LocalFs {
    pub fn new(max_write_bytes: usize) -> Self {
        Self {
            max_write_bytes: max_write_bytes.max(1),
        }
    }

    /// Translate a URI into a local path
    fn path(uri: &str) -> PathBuf {
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }

    /// Re-attach the scheme the caller used
    fn to_uri(template: &str, path: PathBuf) -> String {
        let path = path.to_string_lossy().into_owned();
        if template.starts_with("file://") {
            format!("file://{}", path)
        } else {
            path
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new(crate::constants::MAX_WRITE_BYTES)
    }
}

impl Vfs for LocalFs {
    fn create_dir(&self, uri: &str) -> Result<()> {
        let path = Self::path(uri);
        if path.is_dir() {
            return Err(MosaicError::Vfs(format!(
                "Cannot create directory {}; Directory already exists",
                uri
            )));
        }
        fs::create_dir_all(&path)
            .map_err(|e| MosaicError::Vfs(format!("Cannot create directory {}: {}", uri, e)))
    }

    fn delete_dir(&self, uri: &str) -> Result<()> {
        fs::remove_dir_all(Self::path(uri))
            .map_err(|e| MosaicError::Vfs(format!("Cannot delete directory {}: {}", uri, e)))
    }

    fn move_dir(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(Self::path(from), Self::path(to)).map_err(|e| {
            MosaicError::Vfs(format!("Cannot move directory {} to {}: {}", from, to, e))
        })
    }

    fn is_dir(&self, uri: &str) -> bool {
        Self::path(uri).is_dir()
    }

    fn create_file(&self, uri: &str) -> Result<()> {
        let path = Self::path(uri);
        if path.is_file() {
            return Err(MosaicError::Vfs(format!(
                "Cannot create file {}; File already exists",
                uri
            )));
        }
        File::create(&path)
            .map(|_| ())
            .map_err(|e| MosaicError::Vfs(format!("Cannot create file {}: {}", uri, e)))
    }

    fn delete_file(&self, uri: &str) -> Result<()> {
        fs::remove_file(Self::path(uri))
            .map_err(|e| MosaicError::Vfs(format!("Cannot delete file {}: {}", uri, e)))
    }

    fn is_file(&self, uri: &str) -> bool {
        Self::path(uri).is_file()
    }

    fn read_from_file(&self, uri: &str, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let mut file = File::open(Self::path(uri))
            .map_err(|e| MosaicError::Vfs(format!("Cannot read file {}: {}", uri, e)))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| {
            MosaicError::Vfs(format!("Cannot seek to offset {} in {}: {}", offset, uri, e))
        })?;
        file.read_exact(buffer).map_err(|e| {
            MosaicError::Vfs(format!(
                "Cannot read {} bytes at offset {} from {}: {}",
                buffer.len(),
                offset,
                uri,
                e
            ))
        })
    }

    fn write_to_file(&self, uri: &str, buffer: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::path(uri))
            .map_err(|e| MosaicError::Vfs(format!("Cannot open file {}: {}", uri, e)))?;

        // Append in batches of at most max_write_bytes
        for chunk in buffer.chunks(self.max_write_bytes) {
            file.write_all(chunk)
                .map_err(|e| MosaicError::Vfs(format!("Cannot write to file {}: {}", uri, e)))?;
        }
        file.sync_all()
            .map_err(|e| MosaicError::Vfs(format!("Cannot sync file {}: {}", uri, e)))
    }

    fn list(&self, uri: &str) -> Result<Vec<String>> {
        let entries = fs::read_dir(Self::path(uri))
            .map_err(|e| MosaicError::Vfs(format!("Cannot list files in {}: {}", uri, e)))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry?;
            children.push(Self::to_uri(uri, entry.path()));
        }
        Ok(children)
    }

    fn file_size(&self, uri: &str) -> Result<u64> {
        fs::metadata(Self::path(uri))
            .map(|m| m.len())
            .map_err(|e| MosaicError::Vfs(format!("Cannot get file size of {}: {}", uri, e)))
    }
}
