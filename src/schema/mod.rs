//! Array Schema Module
//!
//! Already-parsed description of an array: its attributes, its dimensions
//! and the cell orderings every layer relies on.
//!
//! ## Attribute Ids
//! ```text
//! ┌──────┬──────┬─────┬────────────────┐
//! │ a0   │ a1   │ ... │ __coords       │
//! │ id 0 │ id 1 │     │ id = attr_num  │
//! └──────┴──────┴─────┴────────────────┘
//! ```
//! The coordinates pseudo-attribute always takes the id right after the
//! last user attribute.

mod attribute;
mod dimension;
mod order;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{self, VAR_NUM};
use crate::datatype::{dispatch_datatype, CellValue, Datatype};
use crate::error::{MosaicError, Result};
use crate::tile::{Compressor, DEFAULT_COMPRESSION_LEVEL};

pub use attribute::Attribute;
pub use dimension::Dimension;
pub(crate) use order::{CellWalk, DenseGrid};

/// Dense arrays materialize every cell of their domain, sparse ones only the
/// cells that were written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayType {
    Dense,
    Sparse,
}

/// Cell ordering used for schema orders and query layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    RowMajor,
    ColMajor,
    GlobalOrder,
    Unordered,
}

impl Layout {
    pub fn name(&self) -> &'static str {
        match self {
            Layout::RowMajor => "row-major",
            Layout::ColMajor => "col-major",
            Layout::GlobalOrder => "global-order",
            Layout::Unordered => "unordered",
        }
    }
}

/// Array schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    array_type: ArrayType,
    /// True if this array backs a key-value store
    kv: bool,
    attributes: Vec<Attribute>,
    dimensions: Vec<Dimension>,
    coords_type: Datatype,
    cell_order: Layout,
    tile_order: Layout,
    /// Cells per tile for sparse fragments
    capacity: u64,
    coords_compressor: Compressor,
    coords_compression_level: i32,
}

impl ArraySchema {
    /// Create a new schema builder
    pub fn builder(array_type: ArrayType) -> ArraySchemaBuilder {
        ArraySchemaBuilder::new(array_type)
    }

    /// Schema of a key-value store holding `attributes`
    ///
    /// Sparse, two `UInt64` dimensions spanning the whole `u64` domain, plus
    /// the reserved key and key-type attributes appended after the user ones.
    pub fn kv(attributes: Vec<Attribute>) -> Result<Self> {
        let mut builder = ArraySchema::builder(ArrayType::Sparse);
        for attribute in attributes {
            builder = builder.attribute(attribute);
        }
        builder.key_value().build()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn array_type(&self) -> ArrayType {
        self.array_type
    }

    pub fn dense(&self) -> bool {
        self.array_type == ArrayType::Dense
    }

    pub fn is_kv(&self) -> bool {
        self.kv
    }

    /// Number of user attributes (also the id of the coordinates)
    pub fn attribute_num(&self) -> usize {
        self.attributes.len()
    }

    pub fn coords_id(&self) -> usize {
        self.attributes.len()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, id: usize) -> Option<&Attribute> {
        self.attributes.get(id)
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    pub fn coords_type(&self) -> Datatype {
        self.coords_type
    }

    /// Size of one coordinate tuple in bytes
    pub fn coords_size(&self) -> usize {
        self.dimensions.len() * self.coords_type.size()
    }

    pub fn cell_order(&self) -> Layout {
        self.cell_order
    }

    pub fn tile_order(&self) -> Layout {
        self.tile_order
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Compressor and level of an attribute's tiles (or the coordinates')
    pub fn compression(&self, id: usize) -> (Compressor, i32) {
        match self.attributes.get(id) {
            Some(a) => (a.compressor(), a.compression_level()),
            None => (self.coords_compressor, self.coords_compression_level),
        }
    }

    /// Whole domain in subarray form: `[lo, hi]` per dimension
    pub fn domain(&self) -> Vec<u8> {
        self.dimensions
            .iter()
            .flat_map(|d| d.domain().iter().copied())
            .collect()
    }

    /// True if every dimension declares a tile extent
    pub fn has_tile_extents(&self) -> bool {
        self.dimensions.iter().all(|d| d.tile_extent().is_some())
    }

    // =========================================================================
    // Attribute Lookups
    // =========================================================================

    /// All attribute names, with the coordinates name last
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.iter().map(|a| a.name().to_string()).collect();
        names.push(constants::COORDS.to_string());
        names
    }

    pub fn attribute_name(&self, id: usize) -> &str {
        match self.attributes.get(id) {
            Some(a) => a.name(),
            None => constants::COORDS,
        }
    }

    /// Resolve an attribute name (or `__coords`) to its id
    pub fn attribute_id(&self, name: &str) -> Result<usize> {
        if name == constants::COORDS {
            return Ok(self.coords_id());
        }
        self.attributes
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| MosaicError::Schema(format!("Attribute '{}' does not exist", name)))
    }

    pub fn attribute_ids<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.attribute_id(n.as_ref())).collect()
    }

    pub fn var_size(&self, id: usize) -> bool {
        self.attributes.get(id).map(|a| a.var_size()).unwrap_or(false)
    }

    /// Fixed cell size of an attribute (or the coordinates), `None` if var-sized
    pub fn cell_size(&self, id: usize) -> Option<usize> {
        match self.attributes.get(id) {
            Some(a) => a.cell_size(),
            None => Some(self.coords_size()),
        }
    }

    pub fn datatype(&self, id: usize) -> Datatype {
        match self.attributes.get(id) {
            Some(a) => a.datatype(),
            None => self.coords_type,
        }
    }

    pub fn cell_val_num(&self, id: usize) -> u32 {
        match self.attributes.get(id) {
            Some(a) => a.cell_val_num(),
            None => self.dimensions.len() as u32,
        }
    }
}

impl fmt::Display for ArraySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let array_type = match self.array_type {
            ArrayType::Dense => "dense",
            ArrayType::Sparse => "sparse",
        };
        writeln!(f, "- Array type: {}", array_type)?;
        writeln!(f, "- Key-value: {}", self.kv)?;
        writeln!(f, "- Cell order: {}", self.cell_order.name())?;
        writeln!(f, "- Tile order: {}", self.tile_order.name())?;
        writeln!(f, "- Capacity: {}", self.capacity)?;
        writeln!(f, "- Coordinates compressor: {}", self.coords_compressor)?;
        writeln!(
            f,
            "- Coordinates compression level: {}",
            self.coords_compression_level
        )?;

        for a in &self.attributes {
            writeln!(f)?;
            writeln!(f, "### Attribute ###")?;
            writeln!(f, "- Name: {}", a.name())?;
            writeln!(f, "- Type: {}", a.datatype())?;
            writeln!(f, "- Compressor: {}", a.compressor())?;
            writeln!(f, "- Compression level: {}", a.compression_level())?;
            if a.var_size() {
                writeln!(f, "- Cell val num: var")?;
            } else {
                writeln!(f, "- Cell val num: {}", a.cell_val_num())?;
            }
        }

        for d in &self.dimensions {
            writeln!(f)?;
            writeln!(f, "### Dimension ###")?;
            writeln!(f, "- Name: {}", d.name())?;
            writeln!(f, "- Type: {}", d.datatype())?;
            writeln!(f, "- Domain: {}", d.domain_string())?;
            writeln!(f, "- Tile extent: {}", d.tile_extent_string())?;
        }
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for ArraySchema
pub struct ArraySchemaBuilder {
    array_type: ArrayType,
    kv: bool,
    attributes: Vec<Attribute>,
    dimensions: Vec<Dimension>,
    cell_order: Layout,
    tile_order: Layout,
    capacity: u64,
    coords_compressor: Compressor,
    coords_compression_level: i32,
    name_max_len: usize,
}

impl ArraySchemaBuilder {
    fn new(array_type: ArrayType) -> Self {
        Self {
            array_type,
            kv: false,
            attributes: Vec::new(),
            dimensions: Vec::new(),
            cell_order: Layout::RowMajor,
            tile_order: Layout::RowMajor,
            capacity: constants::DEFAULT_CAPACITY,
            coords_compressor: Compressor::NoCompression,
            coords_compression_level: DEFAULT_COMPRESSION_LEVEL,
            name_max_len: constants::NAME_MAX_LEN,
        }
    }

    /// Add an attribute
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add a dimension
    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Make this the schema of a key-value store
    ///
    /// `build` then adds the reserved dimensions and attributes.
    pub fn key_value(mut self) -> Self {
        self.kv = true;
        self
    }

    /// Set the cell order (row- or column-major)
    pub fn cell_order(mut self, layout: Layout) -> Self {
        self.cell_order = layout;
        self
    }

    /// Set the tile order (row- or column-major)
    pub fn tile_order(mut self, layout: Layout) -> Self {
        self.tile_order = layout;
        self
    }

    /// Set the sparse tile capacity
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the compressor of the coordinate tiles
    pub fn coords_compressor(mut self, compressor: Compressor, level: i32) -> Self {
        self.coords_compressor = compressor;
        self.coords_compression_level = level;
        self
    }

    /// Set the maximum name length enforced by `build`
    pub fn name_max_len(mut self, len: usize) -> Self {
        self.name_max_len = len;
        self
    }

    /// Validate and build the schema
    pub fn build(mut self) -> Result<ArraySchema> {
        // Step 1: User-declared names
        let mut seen = HashSet::new();
        for name in self
            .attributes
            .iter()
            .map(|a| a.name())
            .chain(self.dimensions.iter().map(|d| d.name()))
        {
            if name.is_empty() || name.len() > self.name_max_len {
                return Err(MosaicError::Schema(format!(
                    "Invalid name length for '{}' (max {})",
                    name, self.name_max_len
                )));
            }
            if constants::reserved_name(name) {
                return Err(MosaicError::Schema(format!(
                    "Cannot use reserved name '{}'",
                    name
                )));
            }
            if !seen.insert(name) {
                return Err(MosaicError::Schema(format!("Duplicate name '{}'", name)));
            }
        }

        // Step 2: Key-value stores get their reserved dimensions and attributes
        if self.kv {
            if !self.dimensions.is_empty() {
                return Err(MosaicError::Schema(
                    "Key-value schemas cannot declare dimensions".to_string(),
                ));
            }
            self.dimensions = vec![
                Dimension::new(constants::KEY_DIM_1, 0u64, u64::MAX),
                Dimension::new(constants::KEY_DIM_2, 0u64, u64::MAX),
            ];
            self.attributes.push(
                Attribute::var(constants::KEY_ATTR_NAME, Datatype::Char)
                    .with_compressor(Compressor::Zstd, DEFAULT_COMPRESSION_LEVEL),
            );
            self.attributes
                .push(Attribute::new(constants::KEY_TYPE_ATTR_NAME, Datatype::UInt8));
        }

        // Step 3: Structural checks
        if self.attributes.is_empty() {
            return Err(MosaicError::Schema(
                "Array schema needs at least one attribute".to_string(),
            ));
        }
        let coords_type = match self.dimensions.first() {
            Some(d) => d.datatype(),
            None => {
                return Err(MosaicError::Schema(
                    "Array schema needs at least one dimension".to_string(),
                ))
            }
        };
        if self.dimensions.iter().any(|d| d.datatype() != coords_type) {
            return Err(MosaicError::Schema(
                "All dimensions must share one datatype".to_string(),
            ));
        }
        if coords_type == Datatype::Char {
            return Err(MosaicError::Schema(
                "Dimensions cannot be of type CHAR".to_string(),
            ));
        }
        if self.array_type == ArrayType::Dense
            && (!coords_type.is_integer() || coords_type == Datatype::UInt64)
        {
            return Err(MosaicError::Schema(format!(
                "Dense arrays need integer coordinates that fit in i64, got {}",
                coords_type
            )));
        }
        for a in &self.attributes {
            if a.cell_val_num() == 0 {
                return Err(MosaicError::Schema(format!(
                    "Attribute '{}' must hold at least one value per cell",
                    a.name()
                )));
            }
            debug_assert!(a.cell_val_num() == VAR_NUM || a.cell_size().is_some());
        }
        for order in [self.cell_order, self.tile_order] {
            if !matches!(order, Layout::RowMajor | Layout::ColMajor) {
                return Err(MosaicError::Schema(format!(
                    "Invalid cell/tile order '{}'",
                    order.name()
                )));
            }
        }
        if self.capacity == 0 {
            return Err(MosaicError::Schema("Capacity must be positive".to_string()));
        }
        for d in &self.dimensions {
            validate_dimension(d)?;
        }

        Ok(ArraySchema {
            array_type: self.array_type,
            kv: self.kv,
            attributes: self.attributes,
            dimensions: self.dimensions,
            coords_type,
            cell_order: self.cell_order,
            tile_order: self.tile_order,
            capacity: self.capacity,
            coords_compressor: self.coords_compressor,
            coords_compression_level: self.coords_compression_level,
        })
    }
}

/// `lo <= hi` and a positive extent no larger than the domain
fn validate_dimension(d: &Dimension) -> Result<()> {
    dispatch_datatype!(d.datatype(), T => {
        let lo = T::read_le(d.domain());
        let hi = T::read_le(&d.domain()[T::SIZE..]);
        if !(lo <= hi) {
            return Err(MosaicError::Schema(format!(
                "Invalid domain for dimension '{}': lower bound exceeds upper bound",
                d.name()
            )));
        }
        if let Some(bytes) = d.tile_extent() {
            let extent = T::read_le(bytes);
            if !(extent > T::from_i64(0)) {
                return Err(MosaicError::Schema(format!(
                    "Tile extent of dimension '{}' must be positive",
                    d.name()
                )));
            }
            if !extent.extent_fits(lo, hi) {
                return Err(MosaicError::Schema(format!(
                    "Tile extent of dimension '{}' exceeds its domain {}",
                    d.name(),
                    d.domain_string()
                )));
            }
        }
        Ok(())
    })
}
