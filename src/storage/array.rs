//! Array handle
//!
//! A cheap, clonable handle over one array directory: its URI, its schema and
//! the filesystem collaborator it lives on. Queries hold a clone for their
//! whole lifetime.

use std::sync::Arc;

use tracing::error;

use crate::config::Config;
use crate::constants::FRAGMENT_PREFIX;
use crate::error::Result;
use crate::fragment::FragmentMetadata;
use crate::kv::KvQueryBuilder;
use crate::query::{QueryBuilder, QueryType};
use crate::schema::ArraySchema;
use crate::vfs::{self, Vfs};

/// Handle to an existing array
#[derive(Debug, Clone)]
pub struct Array {
    uri: String,
    schema: Arc<ArraySchema>,
    vfs: Arc<dyn Vfs>,
    config: Arc<Config>,
}

impl Array {
    pub(crate) fn new(
        uri: String,
        schema: Arc<ArraySchema>,
        vfs: Arc<dyn Vfs>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            uri,
            schema,
            vfs,
            config,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn vfs(&self) -> &dyn Vfs {
        self.vfs.as_ref()
    }

    /// Metadata of every visible fragment, in creation order
    ///
    /// Hidden (dot-prefixed) directories belong to writes that were never
    /// finalized and are ignored.
    pub fn fragment_metadata(&self) -> Result<Vec<FragmentMetadata>> {
        let mut fragments = Vec::new();
        for child in self.vfs.list(&self.uri)? {
            let name = vfs::last_component(&child);
            if !name.starts_with(FRAGMENT_PREFIX) || !self.vfs.is_dir(&child) {
                continue;
            }
            let metadata = FragmentMetadata::load(self.vfs(), &child, self.config.verify_checksums)
                .map_err(|e| {
                    error!(fragment = %name, error = %e, "Cannot load fragment metadata");
                    e
                })?;
            fragments.push(metadata);
        }

        // Oldest first, so later fragments win on overlapping cells
        fragments.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(fragments)
    }

    /// Number of visible fragments
    pub fn fragment_num(&self) -> Result<usize> {
        Ok(self.fragment_metadata()?.len())
    }

    /// Start building a query on this array
    pub fn query(&self, query_type: QueryType) -> QueryBuilder {
        QueryBuilder::new(self.clone(), query_type)
    }

    /// Start building a key-value query (the array must be a key-value store)
    pub fn kv_query(&self, query_type: QueryType) -> KvQueryBuilder {
        KvQueryBuilder::new(self.clone(), query_type)
    }
}
