//! Shared helpers for integration tests.
#![allow(missing_docs, dead_code)]
use lmdb_simple::{LmdbDict, Mode, StoreOptions, StoreResult};
use std::path::PathBuf;
use tempfile::{TempDir, tempdir};

/// A scratch directory and the store path inside it. The store itself does
/// not exist yet.
pub fn scratch() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store");
    (dir, path)
}

/// Opens a fresh writable store in a scratch directory.
pub fn fresh_writer() -> (TempDir, LmdbDict) {
    let (dir, path) = scratch();
    let dict = LmdbDict::open(&path, Mode::ReadWrite, &StoreOptions::default()).unwrap();
    (dir, dict)
}

/// Creates a store holding `pairs` and closes the writer.
pub fn seeded(pairs: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let (dir, path) = scratch();
    let mut dict = LmdbDict::open_writer(&path).unwrap();
    dict.update(pairs.iter().copied()).unwrap();
    dict.close().unwrap();
    (dir, path)
}

/// Drains an iterator of fallible items.
pub fn drain<T>(iter: impl Iterator<Item = StoreResult<T>>) -> Vec<T> {
    iter.collect::<StoreResult<Vec<_>>>().unwrap()
}

/// Keys of `dict`, in iteration order.
pub fn keys_of(dict: &LmdbDict) -> Vec<Vec<u8>> {
    drain(dict.keys().unwrap())
}
