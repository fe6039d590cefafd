//! Key-value queries
//!
//! A [`KvQuery`] wraps a [`Query`] over a key-value array:
//! - writes append the reserved key, key-type and coordinate buffers to the
//!   caller's buffers and run an unordered write
//! - reads turn the single requested key into a one-cell subarray and run a
//!   global-order read

use tracing::debug;

use crate::constants::{self, KEY_ATTR_NAME, KEY_TYPE_ATTR_NAME};
use crate::datatype::encode_values;
use crate::error::{MosaicError, Result};
use crate::query::{Layout, Query, QueryBuffer, QueryCallback, QueryStatus, QueryType};
use crate::storage::Array;

use super::{key_coords, Keys};

/// Builder for KvQuery
pub struct KvQueryBuilder {
    array: Array,
    query_type: QueryType,
    keys: Option<Keys>,
    attributes: Option<Vec<String>>,
    buffers: Vec<QueryBuffer>,
    callback: Option<QueryCallback>,
}

impl KvQueryBuilder {
    pub(crate) fn new(array: Array, query_type: QueryType) -> Self {
        Self {
            array,
            query_type,
            keys: None,
            attributes: None,
            buffers: Vec::new(),
            callback: None,
        }
    }

    /// Keys to write, or the single key to look up
    pub fn keys(mut self, keys: Keys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// User attributes, in buffer order (default: every user attribute)
    pub fn attributes<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.attributes = Some(names.iter().map(|n| n.as_ref().to_string()).collect());
        self
    }

    /// One buffer per user attribute
    pub fn buffers(mut self, buffers: Vec<QueryBuffer>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Completion callback
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(QueryStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<KvQuery> {
        let schema = self.array.schema();
        if !schema.is_kv() {
            return Err(MosaicError::Schema(format!(
                "Array {} is not a key-value store",
                self.array.uri()
            )));
        }
        let keys = self
            .keys
            .ok_or_else(|| MosaicError::Query("Key-value queries need keys".to_string()))?;

        // Step 1: User attributes; the reserved ones are storage-internal
        let user_ids = match &self.attributes {
            Some(names) => {
                if let Some(name) = names.iter().find(|n| constants::reserved_name(n)) {
                    return Err(MosaicError::Query(format!(
                        "Cannot request reserved attribute '{}'",
                        name
                    )));
                }
                schema.attribute_ids(names)?
            }
            None => (0..schema.attribute_num())
                .filter(|&id| !constants::reserved_name(schema.attribute_name(id)))
                .collect(),
        };
        if self.buffers.len() != user_ids.len() {
            return Err(MosaicError::Query(format!(
                "Expected {} buffers, got {}",
                user_ids.len(),
                self.buffers.len()
            )));
        }

        // Step 2: Internal buffers and the wrapped query
        let mut builder = self.array.query(self.query_type);
        let mut attribute_ids = user_ids.clone();
        let mut buffers = self.buffers;
        match self.query_type {
            QueryType::Write => {
                if keys.is_empty() {
                    return Err(MosaicError::Query("No keys to write".to_string()));
                }
                attribute_ids.push(schema.attribute_id(KEY_ATTR_NAME)?);
                attribute_ids.push(schema.attribute_id(KEY_TYPE_ATTR_NAME)?);
                attribute_ids.push(schema.coords_id());

                let types: Vec<u8> = keys.types().iter().map(|&t| t as u8).collect();
                let coords: Vec<u64> = keys
                    .iter()
                    .flat_map(|(datatype, key)| key_coords(datatype, key))
                    .collect();
                buffers.push(QueryBuffer::var(
                    keys.offsets().to_vec(),
                    keys.keys_var().to_vec(),
                ));
                buffers.push(QueryBuffer::from_values(&types));
                buffers.push(QueryBuffer::from_values(&coords));
                builder = builder.layout(Layout::Unordered);
            }
            QueryType::Read => {
                if keys.key_num() != 1 {
                    return Err(MosaicError::Query(format!(
                        "Key-value reads take exactly one key, got {}",
                        keys.key_num()
                    )));
                }
                let (datatype, key) = keys
                    .key(0)
                    .ok_or_else(|| MosaicError::Query("Missing key".to_string()))?;
                let [c0, c1] = key_coords(datatype, key);

                attribute_ids.push(schema.coords_id());
                buffers.push(QueryBuffer::with_capacity(schema.coords_size()));
                builder = builder
                    .layout(Layout::GlobalOrder)
                    .subarray_bytes(encode_values(&[c0, c0, c1, c1]));
            }
        }

        builder = builder.attribute_ids(attribute_ids).buffers(buffers);
        if let Some(callback) = self.callback {
            builder = builder.callback(callback);
        }
        let query = builder.build()?;
        debug!(keys = keys.key_num(), query_type = ?self.query_type, "Initialized key-value query");

        Ok(KvQuery {
            query,
            user_attribute_num: user_ids.len(),
            user_buffer_sizes: Vec::new(),
            keys,
        })
    }
}

/// Read or write of key-value pairs
#[derive(Debug)]
pub struct KvQuery {
    query: Query,
    /// The first `user_attribute_num` buffers belong to the caller
    user_attribute_num: usize,
    /// Flat sizes of the caller's buffers after the last submission:
    /// one entry per fixed-size attribute, two (offsets, values) per var-sized
    user_buffer_sizes: Vec<usize>,
    keys: Keys,
}

impl KvQuery {
    /// Process the query (see [`Query::submit`])
    pub fn submit(&mut self) -> Result<QueryStatus> {
        let status = self.query.submit()?;
        self.reset_user_buffer_sizes();
        Ok(status)
    }

    /// Copy the internal buffer sizes into the caller-visible sizes
    fn reset_user_buffer_sizes(&mut self) {
        self.user_buffer_sizes.clear();
        for buffer in self.query.buffers().iter().take(self.user_attribute_num) {
            if buffer.is_var() {
                self.user_buffer_sizes.push(buffer.offsets_size());
            }
            self.user_buffer_sizes.push(buffer.size());
        }
    }

    /// Replace the caller's buffers, keeping the internal ones
    pub fn reset_buffers(&mut self, mut buffers: Vec<QueryBuffer>) -> Result<()> {
        if buffers.len() != self.user_attribute_num {
            return Err(MosaicError::Query(format!(
                "Expected {} buffers, got {}",
                self.user_attribute_num,
                buffers.len()
            )));
        }
        buffers.extend(
            self.query.buffers()[self.user_attribute_num..]
                .iter()
                .cloned(),
        );
        self.query.reset_buffers(buffers)
    }

    pub fn user_buffer_sizes(&self) -> &[usize] {
        &self.user_buffer_sizes
    }

    /// Caller buffer at `slot`
    pub fn buffer(&self, slot: usize) -> Option<&QueryBuffer> {
        if slot < self.user_attribute_num {
            self.query.buffer(slot)
        } else {
            None
        }
    }

    /// Caller buffer of a user attribute
    pub fn buffer_by_name(&self, name: &str) -> Option<&QueryBuffer> {
        if constants::reserved_name(name) {
            return None;
        }
        self.query.buffer_by_name(name)
    }

    pub fn status(&self) -> QueryStatus {
        self.query.status()
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// The wrapped array query
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.query.finalize()
    }
}
