#![allow(missing_docs)]
mod common;

use common::{drain, fresh_writer, keys_of, scratch, seeded};
use lmdb_simple::{LmdbDict, Mode, StoreError, StoreOptions};
use std::{fs, io};

#[test]
fn read_only_open_of_missing_store_fails() {
    let (_dir, path) = scratch();
    let err = LmdbDict::open_reader(&path).unwrap_err();
    assert!(matches!(err, StoreError::Open { .. }), "{err:?}");
    assert!(!path.exists());
}

#[test]
fn write_open_creates_store_directory_but_not_parents() {
    let (dir, path) = scratch();
    let dict = LmdbDict::open_writer(&path).unwrap();
    assert!(path.is_dir());
    assert!(dict.is_writer());
    assert_eq!(dict.path(), path);

    let nested = dir.path().join("missing").join("store");
    match LmdbDict::open_writer(&nested).unwrap_err() {
        StoreError::Open { path, source } => {
            assert_eq!(path, nested);
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn corrupt_data_file_fails_to_open() {
    let (_dir, path) = scratch();
    fs::create_dir(&path).unwrap();
    fs::write(path.join("data.mdb"), vec![0xa5; 16 * 1024]).unwrap();

    let err = LmdbDict::open_writer(&path).unwrap_err();
    assert!(matches!(err, StoreError::Open { .. }), "{err:?}");
}

#[test]
fn set_then_get_returns_exact_bytes() {
    let (_dir, dict) = fresh_writer();
    dict.set(b"key", b"\x00value\xff").unwrap();
    assert_eq!(dict.get(b"key").unwrap(), b"\x00value\xff");

    dict.set(b"key", b"").unwrap();
    assert_eq!(dict.get(b"key").unwrap(), b"");
}

#[test]
fn missing_and_deleted_keys_are_not_found() {
    let (_dir, dict) = fresh_writer();
    match dict.get(b"never").unwrap_err() {
        StoreError::KeyNotFound(key) => assert_eq!(key, b"never"),
        other => panic!("unexpected {other:?}"),
    }

    dict.set(b"gone", b"soon").unwrap();
    dict.delete(b"gone").unwrap();
    assert!(dict.get(b"gone").unwrap_err().is_not_found());
    assert!(dict.delete(b"gone").unwrap_err().is_not_found());
}

#[test]
fn read_only_handle_rejects_writes() {
    let (_dir, path) = seeded(&[("k", "old")]);
    let reader = LmdbDict::open_reader(&path).unwrap();
    assert_eq!(reader.mode(), Mode::ReadOnly);

    assert!(reader.set(b"k", b"v").unwrap_err().is_read_only());
    assert!(reader.set(b"new", b"v").unwrap_err().is_read_only());
    assert!(reader.delete(b"k").unwrap_err().is_read_only());
    assert!(reader.clear().unwrap_err().is_read_only());
    assert!(matches!(reader.begin(true), Err(StoreError::ReadOnly)));

    assert_eq!(reader.get(b"k").unwrap(), b"old");
    assert_eq!(reader.len().unwrap(), 1);
}

#[test]
fn close_is_idempotent_and_reopen_restores() {
    let (_dir, mut dict) = fresh_writer();
    dict.set(b"k", b"v").unwrap();

    dict.close().unwrap();
    dict.close().unwrap();
    assert!(!dict.is_open());
    assert!(matches!(dict.get(b"k"), Err(StoreError::Closed)));
    assert!(matches!(dict.len(), Err(StoreError::Closed)));
    assert!(matches!(dict.items(), Err(StoreError::Closed)));

    dict.reopen().unwrap();
    dict.reopen().unwrap();
    assert!(dict.is_open());
    assert_eq!(dict.get(b"k").unwrap(), b"v");
}

#[test]
fn drop_releases_environment() {
    let (_dir, path) = scratch();
    {
        let dict = LmdbDict::open_writer(&path).unwrap();
        dict.set(b"k", b"v").unwrap();
    }
    let reader = LmdbDict::open_reader(&path).unwrap();
    assert_eq!(reader.get(b"k").unwrap(), b"v");
}

#[test]
fn keys_iterate_in_byte_order() {
    let (_dir, dict) = fresh_writer();
    dict.set(b"b", b"2").unwrap();
    dict.set(b"a", b"1").unwrap();
    dict.set(b"c", b"3").unwrap();

    assert_eq!(keys_of(&dict), [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    assert_eq!(drain(dict.values().unwrap()), [b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    assert_eq!(
        drain(dict.items().unwrap()),
        [
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn byte_order_is_not_length_order() {
    let (_dir, dict) = fresh_writer();
    for key in [&b"ab"[..], b"b", b"a", b"\x00", b"\xff"] {
        dict.set(key, b"").unwrap();
    }
    assert_eq!(
        keys_of(&dict),
        [b"\x00".to_vec(), b"a".to_vec(), b"ab".to_vec(), b"b".to_vec(), b"\xff".to_vec()]
    );
}

#[test]
fn iterator_is_restartable_and_fused() {
    let (_dir, dict) = fresh_writer();
    dict.update([(b"x", b"1"), (b"y", b"2")]).unwrap();

    let mut keys = dict.keys().unwrap();
    assert_eq!(keys.next().unwrap().unwrap(), b"x");
    assert_eq!(keys.next().unwrap().unwrap(), b"y");
    assert!(keys.next().is_none());
    assert!(keys.next().is_none());

    assert_eq!(keys_of(&dict).len(), 2);
}

#[test]
fn writes_proceed_while_iterator_is_alive() {
    let (_dir, dict) = fresh_writer();
    dict.update([(b"a", b"1"), (b"b", b"2")]).unwrap();

    let mut items = dict.items().unwrap();
    assert_eq!(items.next().unwrap().unwrap().0, b"a");
    dict.set(b"c", b"3").unwrap();
    assert_eq!(dict.get(b"c").unwrap(), b"3");
    assert_eq!(items.next().unwrap().unwrap().0, b"b");
    assert!(items.next().is_none());
}

#[test]
fn len_tracks_writes() {
    let (_dir, dict) = fresh_writer();
    assert!(dict.is_empty().unwrap());

    dict.update((0u32..50).map(|i| (i.to_be_bytes(), b"v"))).unwrap();
    assert_eq!(dict.len().unwrap(), 50);
    assert!(dict.contains_key(&7u32.to_be_bytes()).unwrap());
    assert!(!dict.contains_key(&70u32.to_be_bytes()).unwrap());

    dict.delete(&7u32.to_be_bytes()).unwrap();
    assert_eq!(dict.len().unwrap(), 49);
}

#[test]
fn pop_and_clear() {
    let (_dir, dict) = fresh_writer();
    dict.update([(b"a", b"1"), (b"b", b"2")]).unwrap();

    assert_eq!(dict.pop(b"a").unwrap(), b"1");
    assert!(!dict.contains_key(b"a").unwrap());
    assert!(dict.pop(b"a").unwrap_err().is_not_found());

    dict.clear().unwrap();
    assert!(dict.is_empty().unwrap());
    assert!(keys_of(&dict).is_empty());
}

#[test]
fn flush_on_writer_and_reader() {
    let (_dir, path) = seeded(&[("k", "v")]);
    let mut options = StoreOptions::default();
    options.set_flags(lmdb_simple::OpenFlags::NO_SYNC);

    let mut writer = LmdbDict::open(&path, Mode::ReadWrite, &options).unwrap();
    writer.set(b"k2", b"v2").unwrap();
    writer.flush().unwrap();
    writer.close().unwrap();

    let reader = LmdbDict::open_reader(&path).unwrap();
    reader.flush().unwrap();
    assert_eq!(reader.get(b"k2").unwrap(), b"v2");
}

#[test]
fn full_map_is_a_storage_error() {
    let (_dir, path) = scratch();
    let mut options = StoreOptions::default();
    options.set_map_size(64 * 1024);
    let dict = LmdbDict::open(&path, Mode::ReadWrite, &options).unwrap();

    let err = (0u32..10_000)
        .find_map(|i| dict.set(&i.to_be_bytes(), &[0u8; 1024]).err())
        .expect("map never filled");
    assert!(matches!(err, StoreError::Storage(lmdb::Error::MapFull)), "{err:?}");

    // The handle stays usable for reads after a failed write.
    assert!(dict.get(&0u32.to_be_bytes()).is_ok());
}

#[test]
fn oversized_key_is_a_storage_error() {
    let (_dir, dict) = fresh_writer();
    let err = dict.set(&[b'k'; 512], b"v").unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)), "{err:?}");
    assert!(dict.is_empty().unwrap());

    dict.set(&[b'k'; 511], b"v").unwrap();
}
