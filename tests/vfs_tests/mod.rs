//! Tests for the filesystem collaborators
//!
//! The same contract is checked against both backends.
//!
//! These tests verify:
//! - Directory creation, listing, moving and recursive deletion
//! - Appending writes and ranged reads
//! - Failures are reported as VFS errors

use mosaicdb::vfs::{self, Vfs};
use mosaicdb::{LocalFs, MemFs, MosaicError};
use tempfile::TempDir;

// =============================================================================
// Shared Contract
// =============================================================================

fn check_directories(fs: &dyn Vfs, root: &str) {
    let dir = vfs::join(root, "arr");
    fs.create_dir(&dir).unwrap();
    assert!(fs.is_dir(&dir));
    assert!(!fs.is_file(&dir));
    assert!(matches!(fs.create_dir(&dir), Err(MosaicError::Vfs(_))));

    fs.create_dir(&vfs::join(&dir, "child")).unwrap();
    fs.write_to_file(&vfs::join(&dir, "f.mdb"), b"x").unwrap();

    let mut names: Vec<String> = fs
        .list(&dir)
        .unwrap()
        .iter()
        .map(|u| vfs::last_component(u).to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["child", "f.mdb"]);

    let moved = vfs::join(root, "moved");
    fs.move_dir(&dir, &moved).unwrap();
    assert!(!fs.is_dir(&dir));
    assert!(fs.is_dir(&vfs::join(&moved, "child")));
    assert!(fs.is_file(&vfs::join(&moved, "f.mdb")));

    fs.delete_dir(&moved).unwrap();
    assert!(!fs.is_dir(&moved));
    assert!(!fs.is_file(&vfs::join(&moved, "f.mdb")));
}

fn check_files(fs: &dyn Vfs, root: &str) {
    let file = vfs::join(root, "data.mdb");

    fs.write_to_file(&file, b"hello ").unwrap();
    fs.write_to_file(&file, b"world").unwrap();
    assert_eq!(fs.file_size(&file).unwrap(), 11);
    assert_eq!(fs.read_all(&file).unwrap(), b"hello world");

    let mut buf = [0u8; 5];
    fs.read_from_file(&file, 6, &mut buf).unwrap();
    assert_eq!(&buf, b"world");

    let mut too_long = [0u8; 8];
    assert!(matches!(
        fs.read_from_file(&file, 6, &mut too_long),
        Err(MosaicError::Vfs(_))
    ));

    fs.delete_file(&file).unwrap();
    assert!(!fs.is_file(&file));
    assert!(fs.file_size(&file).is_err());

    let empty = vfs::join(root, "empty.mdb");
    fs.create_file(&empty).unwrap();
    assert_eq!(fs.file_size(&empty).unwrap(), 0);
}

fn check_missing_paths(fs: &dyn Vfs, root: &str) {
    let missing = vfs::join(root, "missing");
    assert!(matches!(fs.list(&missing), Err(MosaicError::Vfs(_))));
    assert!(matches!(fs.delete_dir(&missing), Err(MosaicError::Vfs(_))));
    assert!(matches!(fs.delete_file(&missing), Err(MosaicError::Vfs(_))));
    assert!(matches!(
        fs.move_dir(&missing, &vfs::join(root, "elsewhere")),
        Err(MosaicError::Vfs(_))
    ));
}

// =============================================================================
// MemFs
// =============================================================================

#[test]
fn test_mem_directories() {
    let fs = MemFs::new();
    fs.create_dir("mem://root").unwrap();
    check_directories(&fs, "mem://root");
}

#[test]
fn test_mem_files() {
    let fs = MemFs::new();
    fs.create_dir("mem://root").unwrap();
    check_files(&fs, "mem://root");
}

#[test]
fn test_mem_missing_paths() {
    let fs = MemFs::new();
    fs.create_dir("mem://root").unwrap();
    check_missing_paths(&fs, "mem://root");
}

#[test]
fn test_mem_total_bytes() {
    let fs = MemFs::new();
    fs.write_to_file("mem://a", &[0u8; 100]).unwrap();
    fs.write_to_file("mem://b", &[0u8; 28]).unwrap();
    assert_eq!(fs.total_bytes(), 128);
}

// =============================================================================
// LocalFs
// =============================================================================

fn local_root(temp: &TempDir) -> String {
    format!("file://{}", temp.path().to_string_lossy())
}

#[test]
fn test_local_directories() {
    let temp = TempDir::new().unwrap();
    check_directories(&LocalFs::default(), &local_root(&temp));
}

#[test]
fn test_local_files() {
    let temp = TempDir::new().unwrap();
    check_files(&LocalFs::default(), &local_root(&temp));
}

#[test]
fn test_local_missing_paths() {
    let temp = TempDir::new().unwrap();
    check_missing_paths(&LocalFs::default(), &local_root(&temp));
}

#[test]
fn test_local_chunked_writes() {
    let temp = TempDir::new().unwrap();
    let fs = LocalFs::new(3);
    let file = vfs::join(&local_root(&temp), "chunked.mdb");

    let payload: Vec<u8> = (0..100u8).collect();
    fs.write_to_file(&file, &payload).unwrap();
    assert_eq!(fs.read_all(&file).unwrap(), payload);
}

#[test]
fn test_local_bare_paths() {
    let temp = TempDir::new().unwrap();
    let fs = LocalFs::default();
    let file = temp.path().join("bare.mdb").to_string_lossy().into_owned();

    fs.write_to_file(&file, b"abc").unwrap();
    assert!(temp.path().join("bare.mdb").is_file());
    assert_eq!(fs.file_size(&file).unwrap(), 3);
}
