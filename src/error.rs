use std::{io, os::raw::c_int, path::PathBuf};

/// A result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by [`LmdbDict`], [`Txn`] and [`ReaderPool`].
///
/// No variant is retried internally. Engine failures carry the engine's
/// [`lmdb::Error`], including when they cross a worker process boundary.
///
/// [`LmdbDict`]: crate::LmdbDict
/// [`Txn`]: crate::Txn
/// [`ReaderPool`]: crate::ReaderPool
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The environment could not be created or opened.
    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        /// Path of the store.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
    /// A write was attempted through a read-only handle or transaction.
    #[error("store is not opened for writing")]
    ReadOnly,
    /// Lookup or delete of an absent key.
    #[error("key not found: {}", .0.escape_ascii())]
    KeyNotFound(Vec<u8>),
    /// Engine failure during a transaction.
    #[error("storage engine error: {0}")]
    Storage(#[from] lmdb::Error),
    /// Malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The handle was used after [`LmdbDict::close`].
    ///
    /// [`LmdbDict::close`]: crate::LmdbDict::close
    #[error("store environment is not open")]
    Closed,
    /// The calling thread already holds the write transaction of this
    /// handle. Beginning another would deadlock on the engine's writer lock.
    #[error("a write transaction is already open on this thread")]
    WriteInProgress,
    /// Work was submitted to a pool after [`ReaderPool::close`].
    ///
    /// [`ReaderPool::close`]: crate::ReaderPool::close
    #[error("reader pool is closed")]
    PoolClosed,
    /// A pool worker could not be spawned, reached or reaped.
    #[error("worker process {pid} failed: {source}")]
    Worker {
        /// Process id of the worker, or 0 if it was never spawned.
        pid: i32,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Returns `true` if this is [`StoreError::KeyNotFound`].
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Returns `true` if this is [`StoreError::ReadOnly`].
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    pub(crate) fn worker(pid: i32, source: io::Error) -> Self {
        Self::Worker { pid, source }
    }
}

/// Converts an engine error into an [`io::Error`] so open failures read like
/// filesystem failures where the engine reported an OS error code.
pub(crate) fn engine_io_error(err: lmdb::Error) -> io::Error {
    match err {
        lmdb::Error::Other(code) => io::Error::from_raw_os_error(code),
        other => io::Error::other(other),
    }
}

/// Maps a raw engine return code to a [`StoreResult`].
#[inline]
pub(crate) fn lmdb_result(code: c_int) -> StoreResult<()> {
    match code {
        ffi::MDB_SUCCESS => Ok(()),
        code => Err(StoreError::Storage(lmdb::Error::from_err_code(code))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_not_found_escapes_bytes() {
        let err = StoreError::KeyNotFound(vec![b'k', 0xff, b'\n']);
        assert_eq!(err.to_string(), "key not found: k\\xff\\n");
        assert!(err.is_not_found());
    }

    #[test]
    fn raw_codes() {
        assert!(lmdb_result(ffi::MDB_SUCCESS).is_ok());
        assert!(matches!(
            lmdb_result(ffi::MDB_MAP_FULL),
            Err(StoreError::Storage(lmdb::Error::MapFull))
        ));
    }

    #[test]
    fn os_codes_become_io_kinds() {
        let err = engine_io_error(lmdb::Error::Other(libc::ENOENT));
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err = engine_io_error(lmdb::Error::Invalid);
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }
}
