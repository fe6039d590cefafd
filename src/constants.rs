//! Engine-wide constants
//!
//! Reserved names, persisted file names and limits shared by every layer.

/// Special value for `cell_val_num` meaning a variable number of values per cell
pub const VAR_NUM: u32 = u32::MAX;

/// Size of one variable-cell offset (u64)
pub const CELL_VAR_OFFSET_SIZE: usize = std::mem::size_of::<u64>();

/// Default sparse tile capacity (cells per tile)
pub const DEFAULT_CAPACITY: u64 = 1_000_000;

/// Maximum bytes written to the filesystem in a single call
pub const MAX_WRITE_BYTES: usize = i32::MAX as usize;

/// Maximum attribute / dimension name length
pub const NAME_MAX_LEN: usize = 256;

// =============================================================================
// Persisted Layout
// =============================================================================

/// Suffix of every file written by the engine
pub const FILE_SUFFIX: &str = ".mdb";

/// Array schema file name
pub const ARRAY_SCHEMA_FILENAME: &str = "__array_schema.mdb";

/// Fragment metadata file name
pub const FRAGMENT_METADATA_FILENAME: &str = "__fragment_metadata.mdb";

/// Prefix of visible (finalized) fragment directories
pub const FRAGMENT_PREFIX: &str = "__";

/// Prefix of fragment directories still being written
pub const TEMP_FRAGMENT_PREFIX: &str = ".__";

/// Suffix appended to the attribute name for the var-sized values file
pub const VAR_FILE_SUFFIX: &str = "_var";

// =============================================================================
// Reserved Names
// =============================================================================

/// Reserved name of the coordinates pseudo-attribute
pub const COORDS: &str = "__coords";

/// Reserved name of the first key-value dimension
pub const KEY_DIM_1: &str = "__key_dim_1";

/// Reserved name of the second key-value dimension
pub const KEY_DIM_2: &str = "__key_dim_2";

/// Reserved name of the key attribute in a key-value store
pub const KEY_ATTR_NAME: &str = "__key";

/// Reserved name of the key type attribute in a key-value store
pub const KEY_TYPE_ATTR_NAME: &str = "__key_type";

/// True if `name` is reserved for internal use
pub fn reserved_name(name: &str) -> bool {
    matches!(
        name,
        COORDS | KEY_DIM_1 | KEY_DIM_2 | KEY_ATTR_NAME | KEY_TYPE_ATTR_NAME
    )
}
