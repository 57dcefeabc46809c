//! Utility functions for benchmarks.
#![allow(dead_code, unreachable_pub)]

use lmdb_simple::{LmdbDict, Mode, StoreOptions};
use rand::{SeedableRng, prelude::SliceRandom, rngs::StdRng};
use std::path::PathBuf;
use tempfile::{TempDir, tempdir};

/// Generate a key for testing.
pub fn get_key(n: u32) -> String {
    format!("key{n}")
}

/// Generate a value for testing.
pub fn get_data(n: u32) -> String {
    format!("data{n}")
}

/// Keys `0..n` in a fixed shuffled order.
pub fn shuffled_keys(n: u32) -> Vec<String> {
    let mut keys: Vec<String> = (0..n).map(get_key).collect();
    keys.shuffle(&mut StdRng::from_seed(Default::default()));
    keys
}

/// Create a store with the specified number of rows and close the writer.
pub fn setup_bench_store(num_rows: u32) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench");
    let mut options = StoreOptions::default();
    options.set_map_size(1 << 30);

    let mut dict = LmdbDict::open(&path, Mode::ReadWrite, &options).unwrap();
    dict.update((0..num_rows).map(|i| (get_key(i), get_data(i)))).unwrap();
    dict.close().unwrap();
    (dir, path)
}

/// Open a writer on a benchmark store.
pub fn bench_writer(num_rows: u32) -> (TempDir, LmdbDict) {
    let (dir, path) = setup_bench_store(num_rows);
    let mut options = StoreOptions::default();
    options.set_map_size(1 << 30);
    (dir, LmdbDict::open(&path, Mode::ReadWrite, &options).unwrap())
}
