use crate::{StoreResult, error::lmdb_result};
use lmdb::{Cursor, Database, RoCursor, Transaction};
use std::{mem::MaybeUninit, os::raw::c_uint};

/// Where a cursor walk resumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Position {
    /// Before the first key.
    Start,
    /// Strictly after the given key.
    After(Vec<u8>),
}

/// Returns the number of entries in `dbi` as seen by `txn`.
///
/// # Safety
///
/// `txn` must be a live transaction and `dbi` a handle opened in its
/// environment.
pub(crate) unsafe fn entries_raw(txn: *mut ffi::MDB_txn, dbi: ffi::MDB_dbi) -> StoreResult<usize> {
    let mut stat = MaybeUninit::<ffi::MDB_stat>::uninit();
    // SAFETY: caller guarantees txn and dbi. stat is fully written on success.
    lmdb_result(unsafe { ffi::mdb_stat(txn, dbi, stat.as_mut_ptr()) })?;
    Ok(unsafe { stat.assume_init() }.ms_entries)
}

/// Returns the number of entries in `db`, including writes not yet committed
/// by `txn`.
pub(crate) fn entries<T: Transaction>(txn: &T, db: Database) -> StoreResult<usize> {
    // SAFETY: txn is borrowed for the duration of the call and db was opened
    // in its environment.
    unsafe { entries_raw(txn.txn(), db.dbi()) }
}

/// Reads the entry following `from` in key order.
///
/// A fresh cursor is positioned on every call, so nothing borrowed from the
/// transaction outlives it. If the key at `from` was deleted in the meantime
/// the walk continues at the next greater key.
pub(crate) fn next_entry<T: Transaction>(
    txn: &T,
    db: Database,
    from: &Position,
) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
    let cursor = txn.open_ro_cursor(db)?;
    let found = match from {
        Position::Start => cursor_get(&cursor, None, ffi::MDB_FIRST)?,
        Position::After(last) => {
            match cursor_get(&cursor, Some(last.as_slice()), ffi::MDB_SET_RANGE)? {
                Some((key, _)) if key == last.as_slice() => {
                    cursor_get(&cursor, None, ffi::MDB_NEXT)?
                }
                other => other,
            }
        }
    };
    Ok(found.map(|(key, value)| (key.to_vec(), value.to_vec())))
}

fn cursor_get<'txn>(
    cursor: &RoCursor<'txn>,
    key: Option<&[u8]>,
    op: c_uint,
) -> StoreResult<Option<(&'txn [u8], &'txn [u8])>> {
    match cursor.get(key, None, op) {
        Ok((Some(key), value)) => Ok(Some((key, value))),
        Ok((None, _)) | Err(lmdb::Error::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
