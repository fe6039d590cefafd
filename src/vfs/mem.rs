//! In-memory filesystem backend
//!
//! Keeps a flat map of normalized URI → node. Useful for tests and for
//! arrays that never need to outlive the process.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{MosaicError, Result};

use super::Vfs;

#[derive(Debug)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory implementation of [`Vfs`]
///
/// ## Concurrency:
/// - Single `RwLock` over the whole tree; reads share, mutations are exclusive
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(uri: &str) -> String {
        uri.trim_end_matches('/').to_string()
    }

    /// All strict ancestors of `key` that sit below the scheme
    fn ancestors(key: &str) -> Vec<String> {
        let body_start = key.find("://").map(|i| i + 3).unwrap_or(0);
        let mut out = Vec::new();
        for (idx, ch) in key.char_indices().skip(body_start) {
            if ch == '/' && idx > body_start {
                out.push(key[..idx].to_string());
            }
        }
        out
    }

    fn is_child_of(candidate: &str, parent: &str) -> bool {
        candidate.len() > parent.len()
            && candidate.starts_with(parent)
            && candidate.as_bytes()[parent.len()] == b'/'
    }

    /// Total bytes currently held (for tests and debugging)
    pub fn total_bytes(&self) -> usize {
        self.nodes
            .read()
            .values()
            .map(|n| match n {
                Node::File(data) => data.len(),
                Node::Dir => 0,
            })
            .sum()
    }
}

impl Vfs for MemFs {
    fn create_dir(&self, uri: &str) -> Result<()> {
        let key = Self::key(uri);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&key) {
            return Err(MosaicError::Vfs(format!(
                "Cannot create directory {}; Path already exists",
                uri
            )));
        }
        for ancestor in Self::ancestors(&key) {
            nodes.entry(ancestor).or_insert(Node::Dir);
        }
        nodes.insert(key, Node::Dir);
        Ok(())
    }

    fn delete_dir(&self, uri: &str) -> Result<()> {
        let key = Self::key(uri);
        let mut nodes = self.nodes.write();
        if !matches!(nodes.get(&key), Some(Node::Dir)) {
            return Err(MosaicError::Vfs(format!(
                "Cannot delete directory {}; Not a directory",
                uri
            )));
        }
        nodes.retain(|k, _| k != &key && !Self::is_child_of(k, &key));
        Ok(())
    }

    fn move_dir(&self, from: &str, to: &str) -> Result<()> {
        let from_key = Self::key(from);
        let to_key = Self::key(to);
        let mut nodes = self.nodes.write();
        if !matches!(nodes.get(&from_key), Some(Node::Dir)) {
            return Err(MosaicError::Vfs(format!(
                "Cannot move directory {}; Not a directory",
                from
            )));
        }
        if nodes.contains_key(&to_key) {
            return Err(MosaicError::Vfs(format!(
                "Cannot move directory {} to {}; Destination exists",
                from, to
            )));
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| *k == &from_key || Self::is_child_of(k, &from_key))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{}{}", to_key, &old[from_key.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn is_dir(&self, uri: &str) -> bool {
        matches!(self.nodes.read().get(&Self::key(uri)), Some(Node::Dir))
    }

    fn create_file(&self, uri: &str) -> Result<()> {
        let key = Self::key(uri);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&key) {
            return Err(MosaicError::Vfs(format!(
                "Cannot create file {}; Path already exists",
                uri
            )));
        }
        nodes.insert(key, Node::File(Vec::new()));
        Ok(())
    }

    fn delete_file(&self, uri: &str) -> Result<()> {
        let key = Self::key(uri);
        let mut nodes = self.nodes.write();
        match nodes.get(&key) {
            Some(Node::File(_)) => {
                nodes.remove(&key);
                Ok(())
            }
            _ => Err(MosaicError::Vfs(format!(
                "Cannot delete file {}; Not a file",
                uri
            ))),
        }
    }

    fn is_file(&self, uri: &str) -> bool {
        matches!(self.nodes.read().get(&Self::key(uri)), Some(Node::File(_)))
    }

    fn read_from_file(&self, uri: &str, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let nodes = self.nodes.read();
        let data = match nodes.get(&Self::key(uri)) {
            Some(Node::File(data)) => data,
            _ => {
                return Err(MosaicError::Vfs(format!(
                    "Cannot read file {}; File does not exist",
                    uri
                )))
            }
        };

        let start = offset as usize;
        let end = start + buffer.len();
        if end > data.len() {
            return Err(MosaicError::Vfs(format!(
                "Cannot read {} bytes at offset {} from {}; File has {} bytes",
                buffer.len(),
                offset,
                uri,
                data.len()
            )));
        }
        buffer.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_to_file(&self, uri: &str, buffer: &[u8]) -> Result<()> {
        let key = Self::key(uri);
        let mut nodes = self.nodes.write();
        match nodes.entry(key).or_insert_with(|| Node::File(Vec::new())) {
            Node::File(data) => {
                data.extend_from_slice(buffer);
                Ok(())
            }
            Node::Dir => Err(MosaicError::Vfs(format!(
                "Cannot write to file {}; Path is a directory",
                uri
            ))),
        }
    }

    fn list(&self, uri: &str) -> Result<Vec<String>> {
        let key = Self::key(uri);
        let nodes = self.nodes.read();
        if !matches!(nodes.get(&key), Some(Node::Dir)) {
            return Err(MosaicError::Vfs(format!(
                "Cannot list files in {}; Not a directory",
                uri
            )));
        }
        Ok(nodes
            .keys()
            .filter(|k| Self::is_child_of(k, &key) && !k[key.len() + 1..].contains('/'))
            .cloned()
            .collect())
    }

    fn file_size(&self, uri: &str) -> Result<u64> {
        match self.nodes.read().get(&Self::key(uri)) {
            Some(Node::File(data)) => Ok(data.len() as u64),
            _ => Err(MosaicError::Vfs(format!(
                "Cannot get file size of {}; File does not exist",
                uri
            ))),
        }
    }
}
