//! Storage Manager
//!
//! Entry point of the engine: creates, opens and deletes arrays on a
//! filesystem collaborator.
//!
//! ## Responsibilities
//! - Persist array schemas (`__array_schema.mdb`)
//! - Open arrays, caching their schemas
//! - Hand out schema builders carrying the configured defaults

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::ARRAY_SCHEMA_FILENAME;
use crate::error::{MosaicError, Result};
use crate::schema::{ArraySchema, ArraySchemaBuilder, ArrayType, Attribute};
use crate::vfs::{self, LocalFs, MemFs, Vfs};

use super::codec::{decode_checksummed, encode_checksummed};
use super::Array;

/// Manages arrays stored on one filesystem collaborator
///
/// ## Concurrency:
/// - `schemas`: Protected by RwLock (many concurrent openers, exclusive on create/delete)
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    vfs: Arc<dyn Vfs>,
    config: Arc<Config>,

    /// Schemas of arrays opened or created through this manager, by URI
    schemas: RwLock<HashMap<String, Arc<ArraySchema>>>,
}

impl StorageManager {
    /// Create a manager over an arbitrary filesystem collaborator
    pub fn new(vfs: Arc<dyn Vfs>, config: Config) -> Self {
        Self {
            vfs,
            config: Arc::new(config),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Manager over the local disk, chunking writes per `config.max_write_bytes`
    pub fn local(config: Config) -> Self {
        let vfs = Arc::new(LocalFs::new(config.max_write_bytes));
        Self::new(vfs, config)
    }

    /// Manager over a fresh in-memory filesystem
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemFs::new()), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    /// Schema builder using the configured capacity and name length limit
    pub fn schema_builder(&self, array_type: ArrayType) -> ArraySchemaBuilder {
        ArraySchema::builder(array_type)
            .capacity(self.config.default_capacity)
            .name_max_len(self.config.name_max_len)
    }

    // =========================================================================
    // Array Lifecycle
    // =========================================================================

    /// Create a new array directory holding `schema`
    pub fn array_create(&self, uri: &str, schema: &ArraySchema) -> Result<()> {
        if self.is_array(uri) {
            return Err(MosaicError::Schema(format!(
                "Cannot create array {}; Array already exists",
                uri
            )));
        }

        let bytes = encode_checksummed(schema)?;
        self.vfs.create_dir(uri)?;
        self.vfs.write_to_file(&Self::schema_uri(uri), &bytes)?;

        self.schemas
            .write()
            .insert(uri.to_string(), Arc::new(schema.clone()));

        info!(
            array = %uri,
            dense = schema.dense(),
            kv = schema.is_kv(),
            attributes = schema.attribute_num(),
            dimensions = schema.dim_num(),
            "Created array"
        );
        Ok(())
    }

    /// Create a key-value store holding `attributes`
    pub fn kv_create(&self, uri: &str, attributes: Vec<Attribute>) -> Result<()> {
        let mut builder = self.schema_builder(ArrayType::Sparse).key_value();
        for attribute in attributes {
            builder = builder.attribute(attribute);
        }
        let schema = builder.build()?;
        self.array_create(uri, &schema)
    }

    /// Open an existing array
    pub fn array_open(&self, uri: &str) -> Result<Array> {
        if let Some(schema) = self.schemas.read().get(uri) {
            return Ok(Array::new(
                uri.to_string(),
                Arc::clone(schema),
                Arc::clone(&self.vfs),
                Arc::clone(&self.config),
            ));
        }

        if !self.is_array(uri) {
            return Err(MosaicError::Schema(format!(
                "Cannot open array {}; Not an array",
                uri
            )));
        }
        let bytes = self.vfs.read_all(&Self::schema_uri(uri))?;
        let schema: Arc<ArraySchema> =
            Arc::new(decode_checksummed(&bytes, self.config.verify_checksums)?);
        debug!(array = %uri, "Loaded array schema");

        self.schemas
            .write()
            .insert(uri.to_string(), Arc::clone(&schema));

        Ok(Array::new(
            uri.to_string(),
            schema,
            Arc::clone(&self.vfs),
            Arc::clone(&self.config),
        ))
    }

    /// True if `uri` is a directory holding an array schema
    pub fn is_array(&self, uri: &str) -> bool {
        self.vfs.is_dir(uri) && self.vfs.is_file(&Self::schema_uri(uri))
    }

    /// Delete an array and all its fragments
    pub fn array_delete(&self, uri: &str) -> Result<()> {
        if !self.is_array(uri) {
            return Err(MosaicError::Schema(format!(
                "Cannot delete array {}; Not an array",
                uri
            )));
        }
        self.schemas.write().remove(uri);
        self.vfs.delete_dir(uri)?;
        info!(array = %uri, "Deleted array");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn schema_uri(uri: &str) -> String {
        vfs::join(uri, ARRAY_SCHEMA_FILENAME)
    }
}
