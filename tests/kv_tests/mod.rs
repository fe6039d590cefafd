//! Tests for the key-value layer
//!
//! These tests verify:
//! - Keys of any type map to cells and read back their values
//! - Reserved attributes stay internal to the store
//! - Keys with equal bytes but different types are distinct
//! - Later writes of a key replace earlier ones

use mosaicdb::kv::key_coords;
use mosaicdb::{
    Array, Attribute, Config, Datatype, Keys, KvQuery, MosaicError, QueryBuffer, QueryStatus,
    QueryType, StorageManager,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// Store with `value` (i32) and `name` (var char)
fn setup_store() -> (StorageManager, Array) {
    let manager = StorageManager::in_memory(Config::default());
    manager
        .kv_create(
            "mem://kv",
            vec![
                Attribute::new("value", Datatype::Int32),
                Attribute::var("name", Datatype::Char),
            ],
        )
        .unwrap();
    let array = manager.array_open("mem://kv").unwrap();
    (manager, array)
}

fn write_pairs(array: &Array, keys: Keys, values: &[i32], names: &[&str]) {
    let mut query = array
        .kv_query(QueryType::Write)
        .keys(keys)
        .buffers(vec![
            QueryBuffer::from_values(values),
            QueryBuffer::from_strings(names),
        ])
        .build()
        .unwrap();
    assert_eq!(query.submit().unwrap(), QueryStatus::Completed);
    query.finalize().unwrap();
}

fn lookup(array: &Array, key: Keys) -> KvQuery {
    let mut query = array
        .kv_query(QueryType::Read)
        .keys(key)
        .buffers(vec![
            QueryBuffer::with_capacity(4),
            QueryBuffer::var_with_capacity(1, 64),
        ])
        .build()
        .unwrap();
    assert_eq!(query.submit().unwrap(), QueryStatus::Completed);
    query
}

fn single<F>(add: F) -> Keys
where
    F: FnOnce(&mut Keys) -> mosaicdb::Result<()>,
{
    let mut keys = Keys::new();
    add(&mut keys).unwrap();
    keys
}

fn sample_keys() -> Keys {
    let mut keys = Keys::new();
    keys.add(100i32).unwrap();
    keys.add_str("key_4").unwrap();
    keys.add(2.5f64).unwrap();
    keys
}

// =============================================================================
// Keys Tests
// =============================================================================

#[test]
fn test_keys_container() {
    let keys = sample_keys();

    assert_eq!(keys.key_num(), 3);
    assert_eq!(keys.offsets(), &[0, 4, 9]);
    assert_eq!(keys.offsets_size(), 24);
    assert_eq!(keys.keys_var_size(), 17);
    assert_eq!(keys.key(1), Some((Datatype::Char, "key_4".as_bytes())));
    assert_eq!(keys.key(3), None);

    let types: Vec<Datatype> = keys.iter().map(|(t, _)| t).collect();
    assert_eq!(types, vec![Datatype::Int32, Datatype::Char, Datatype::Float64]);
}

#[test]
fn test_keys_round_trip_random() {
    // xorshift64, fixed seed
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let mut expected: Vec<(Datatype, Vec<u8>)> = Vec::new();
    let mut keys = Keys::new();
    for _ in 0..200 {
        let r = next();
        let (datatype, bytes) = match r % 3 {
            0 => (Datatype::Int64, (r as i64).to_le_bytes().to_vec()),
            1 => (Datatype::Float32, ((r % 1000) as f32 / 7.0).to_le_bytes().to_vec()),
            _ => {
                let len = 1 + (r % 12) as usize;
                (Datatype::Char, (0..len).map(|i| b'a' + ((r >> i) % 26) as u8).collect())
            }
        };
        keys.add_key(&bytes, datatype).unwrap();
        expected.push((datatype, bytes));
    }

    assert_eq!(keys.key_num(), expected.len());
    for (i, (datatype, bytes)) in expected.iter().enumerate() {
        assert_eq!(keys.key(i), Some((*datatype, bytes.as_slice())));
    }
}

#[test]
fn test_empty_and_ragged_keys_rejected() {
    let mut keys = Keys::new();
    assert!(keys.add_str("").is_err());
    assert!(keys.add_key(&[1, 2, 3], Datatype::Int32).is_err());
    assert!(keys.is_empty());
}

#[test]
fn test_key_type_is_part_of_identity() {
    let bytes = 7i32.to_le_bytes();
    assert_ne!(
        key_coords(Datatype::Int32, &bytes),
        key_coords(Datatype::UInt32, &bytes)
    );
}

// =============================================================================
// Store Tests
// =============================================================================

#[test]
fn test_write_then_read_each_key() {
    let (_manager, array) = setup_store();
    write_pairs(&array, sample_keys(), &[1, 4, 25], &["one", "four", "twenty-five"]);

    let query = lookup(&array, single(|k| k.add(100i32)));
    assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![1]);
    assert_eq!(query.buffer(1).unwrap().strings(), vec!["one".to_string()]);
    assert_eq!(query.user_buffer_sizes(), &[4, 8, 3]);

    let query = lookup(&array, single(|k| k.add_str("key_4")));
    assert_eq!(query.buffer_by_name("value").unwrap().to_vec::<i32>(), vec![4]);
    assert_eq!(
        query.buffer_by_name("name").unwrap().strings(),
        vec!["four".to_string()]
    );

    let query = lookup(&array, single(|k| k.add(2.5f64)));
    assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![25]);
    assert_eq!(query.user_buffer_sizes(), &[4, 8, 11]);
}

#[test]
fn test_missing_key_reads_nothing() {
    let (_manager, array) = setup_store();
    write_pairs(&array, sample_keys(), &[1, 4, 25], &["one", "four", "twenty-five"]);

    let query = lookup(&array, single(|k| k.add_str("absent")));
    assert!(query.buffer(0).unwrap().to_vec::<i32>().is_empty());
    assert_eq!(query.user_buffer_sizes(), &[0, 0, 0]);
}

#[test]
fn test_same_bytes_different_type_are_distinct_keys() {
    let (_manager, array) = setup_store();

    let mut keys = Keys::new();
    keys.add(7i32).unwrap();
    keys.add(7u32).unwrap();
    write_pairs(&array, keys, &[-7, 7], &["signed", "unsigned"]);

    let signed = lookup(&array, single(|k| k.add(7i32)));
    assert_eq!(signed.buffer(0).unwrap().to_vec::<i32>(), vec![-7]);

    let unsigned = lookup(&array, single(|k| k.add(7u32)));
    assert_eq!(unsigned.buffer(0).unwrap().to_vec::<i32>(), vec![7]);
}

#[test]
fn test_latest_write_wins() {
    let (_manager, array) = setup_store();

    write_pairs(&array, single(|k| k.add_str("k")), &[1], &["old"]);
    write_pairs(&array, single(|k| k.add_str("k")), &[2], &["new"]);

    let query = lookup(&array, single(|k| k.add_str("k")));
    assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![2]);
    assert_eq!(query.buffer(1).unwrap().strings(), vec!["new".to_string()]);
    assert_eq!(array.fragment_num().unwrap(), 2);
}

/// Keys are identified by their digest alone: a different key stored at the
/// same coordinates is returned for a lookup. Collisions are not detected.
#[test]
fn test_colliding_digest_is_indistinguishable() {
    let (_manager, array) = setup_store();
    write_pairs(&array, single(|k| k.add_str("a")), &[1], &["a"]);

    // Stand in for a colliding key by storing "b" at the cell of "a"
    let coords = key_coords(Datatype::Char, b"a");
    let mut query = array
        .query(QueryType::Write)
        .layout(mosaicdb::Layout::Unordered)
        .buffers(vec![
            QueryBuffer::from_values(&[9i32]),
            QueryBuffer::from_strings(&["imposter"]),
            QueryBuffer::from_strings(&["b"]),
            QueryBuffer::from_values(&[Datatype::Char as u8]),
            QueryBuffer::from_values(&coords),
        ])
        .build()
        .unwrap();
    query.submit().unwrap();
    query.finalize().unwrap();

    let query = lookup(&array, single(|k| k.add_str("a")));
    assert_eq!(query.buffer(0).unwrap().to_vec::<i32>(), vec![9]);
    assert_eq!(query.buffer(1).unwrap().strings(), vec!["imposter".to_string()]);
}

#[test]
fn test_read_subset_of_attributes() {
    let (_manager, array) = setup_store();
    write_pairs(&array, sample_keys(), &[1, 4, 25], &["one", "four", "twenty-five"]);

    let mut query = array
        .kv_query(QueryType::Read)
        .keys(single(|k| k.add_str("key_4")))
        .attributes(&["name"])
        .buffers(vec![QueryBuffer::var_with_capacity(1, 16)])
        .build()
        .unwrap();
    query.submit().unwrap();

    assert_eq!(query.buffer(0).unwrap().strings(), vec!["four".to_string()]);
    assert!(query.buffer(1).is_none());
    assert!(query.buffer_by_name("__key").is_none());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_read_takes_exactly_one_key() {
    let (_manager, array) = setup_store();

    let result = array
        .kv_query(QueryType::Read)
        .keys(sample_keys())
        .buffers(vec![
            QueryBuffer::with_capacity(4),
            QueryBuffer::var_with_capacity(1, 64),
        ])
        .build();
    assert!(matches!(result, Err(MosaicError::Query(_))));

    let missing = array
        .kv_query(QueryType::Read)
        .buffers(vec![
            QueryBuffer::with_capacity(4),
            QueryBuffer::var_with_capacity(1, 64),
        ])
        .build();
    assert!(matches!(missing, Err(MosaicError::Query(_))));
}

#[test]
fn test_write_without_keys_rejected() {
    let (_manager, array) = setup_store();

    let result = array
        .kv_query(QueryType::Write)
        .keys(Keys::new())
        .buffers(vec![
            QueryBuffer::from_values::<i32>(&[]),
            QueryBuffer::var(Vec::new(), Vec::new()),
        ])
        .build();
    assert!(matches!(result, Err(MosaicError::Query(_))));
}

#[test]
fn test_reserved_attribute_rejected() {
    let (_manager, array) = setup_store();

    let result = array
        .kv_query(QueryType::Read)
        .keys(single(|k| k.add_str("k")))
        .attributes(&["__key"])
        .buffers(vec![QueryBuffer::var_with_capacity(1, 16)])
        .build();
    assert!(matches!(result, Err(MosaicError::Query(_))));
}

#[test]
fn test_user_buffer_count_checked() {
    let (_manager, array) = setup_store();

    let result = array
        .kv_query(QueryType::Write)
        .keys(single(|k| k.add_str("k")))
        .buffers(vec![QueryBuffer::from_values(&[1i32])])
        .build();
    assert!(matches!(result, Err(MosaicError::Query(_))));
}

#[test]
fn test_kv_query_on_plain_array_rejected() {
    let manager = StorageManager::in_memory(Config::default());
    let schema = manager
        .schema_builder(mosaicdb::ArrayType::Sparse)
        .attribute(Attribute::new("a1", Datatype::Int32))
        .dimension(mosaicdb::Dimension::new("d", 0i64, 10))
        .build()
        .unwrap();
    manager.array_create("mem://plain", &schema).unwrap();
    let array = manager.array_open("mem://plain").unwrap();

    let result = array
        .kv_query(QueryType::Read)
        .keys(single(|k| k.add_str("k")))
        .buffers(vec![QueryBuffer::with_capacity(4)])
        .build();
    assert!(matches!(result, Err(MosaicError::Schema(_))));
}
