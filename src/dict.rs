use crate::{
    Mode, StoreError, StoreOptions, StoreResult,
    sys::EnvHandle,
    tx::{Iter, Keys, Txn, Values},
};
use std::path::{Path, PathBuf};
use tracing::{instrument, warn};

/// A byte-keyed mapping stored in an LMDB environment on disk.
///
/// Each handle owns one environment bound to a path. Single-key methods run
/// in their own short transaction; [`LmdbDict::transaction`] groups several
/// operations into one atomic unit. Every method also has an `_in` form
/// taking an optional [`Txn`] to run inside instead.
///
/// ```no_run
/// use lmdb_simple::{LmdbDict, Mode, StoreResult};
///
/// # fn main() -> StoreResult<()> {
/// let mut dict = LmdbDict::open("/tmp/dict", Mode::ReadWrite, &Default::default())?;
/// dict.set(b"hello", b"world")?;
/// assert_eq!(dict.get(b"hello")?, b"world");
///
/// dict.transaction(true, |txn| {
///     txn.put(b"a", b"1")?;
///     txn.put(b"b", b"2")
/// })?;
/// assert_eq!(dict.len()?, 3);
/// dict.close()
/// # }
/// ```
#[derive(Debug)]
pub struct LmdbDict {
    path: PathBuf,
    mode: Mode,
    options: StoreOptions,
    /// `None` once closed.
    env: Option<EnvHandle>,
}

impl LmdbDict {
    /// Opens the store at `path`.
    ///
    /// In [`Mode::ReadWrite`] the store directory is created if it does not
    /// exist, but its parent must. In [`Mode::ReadOnly`] the store must
    /// already exist.
    pub fn open(path: impl AsRef<Path>, mode: Mode, options: &StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let env = EnvHandle::open(&path, mode, options)?;
        Ok(Self { path, mode, options: *options, env: Some(env) })
    }

    /// Opens an existing store read-only with default options.
    pub fn open_reader(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(path, Mode::ReadOnly, &StoreOptions::default())
    }

    /// Opens or creates a store read-write with default options.
    pub fn open_writer(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(path, Mode::ReadWrite, &StoreOptions::default())
    }

    /// Path of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode the handle was opened with.
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Options the handle was opened with.
    pub const fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Returns `true` if the handle accepts writes.
    pub const fn is_writer(&self) -> bool {
        self.mode.is_read_write()
    }

    /// Returns `true` until [`LmdbDict::close`] is called.
    pub const fn is_open(&self) -> bool {
        self.env.is_some()
    }

    fn handle(&self) -> StoreResult<&EnvHandle> {
        self.env.as_ref().ok_or(StoreError::Closed)
    }

    /// Begins a transaction on this store.
    ///
    /// The returned guard aborts when dropped unless [`Txn::commit`] is
    /// called. A thread may hold at most one write transaction per handle;
    /// a second fails with [`StoreError::WriteInProgress`].
    pub fn begin(&self, write: bool) -> StoreResult<Txn<'_>> {
        Txn::begin(self.handle()?, write)
    }

    /// Runs `f` inside one transaction.
    ///
    /// The transaction commits when `f` returns `Ok`, and aborts when `f`
    /// returns `Err` or panics. A failed commit is reported as the error of
    /// the whole scope.
    pub fn transaction<T, E, F>(&self, write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Txn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut txn = self.begin(write)?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    /// Rejects transactions begun on another handle.
    fn check_txn(&self, txn: &Txn<'_>) -> StoreResult<()> {
        if txn.belongs_to(self.handle()?) {
            Ok(())
        } else {
            Err(StoreError::InvalidArgument("transaction belongs to a different store".into()))
        }
    }

    fn read<T>(
        &self,
        txn: Option<&Txn<'_>>,
        f: impl FnOnce(&Txn<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        match txn {
            Some(txn) => {
                self.check_txn(txn)?;
                f(txn)
            }
            None => {
                let txn = self.begin(false)?;
                let res = f(&txn);
                txn.abort();
                res
            }
        }
    }

    fn write<T>(
        &self,
        txn: Option<&mut Txn<'_>>,
        f: impl FnOnce(&mut Txn<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.handle()?;
        if !self.is_writer() {
            return Err(StoreError::ReadOnly);
        }
        match txn {
            Some(txn) => {
                self.check_txn(txn)?;
                f(txn)
            }
            None => self.transaction(true, f),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.get_in(None, key)
    }

    /// [`LmdbDict::get`] inside `txn` when given.
    pub fn get_in(&self, txn: Option<&Txn<'_>>, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.read(txn, |txn| txn.get(key))
    }

    /// Stores `value` under `key` and commits.
    pub fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.set_in(None, key, value)
    }

    /// [`LmdbDict::set`] inside `txn` when given. The write becomes visible
    /// when `txn` commits.
    pub fn set_in(&self, txn: Option<&mut Txn<'_>>, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.write(txn, |txn| txn.put(key, value))
    }

    /// Removes `key`. Fails with [`StoreError::KeyNotFound`] if absent.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.delete_in(None, key)
    }

    /// [`LmdbDict::delete`] inside `txn` when given.
    pub fn delete_in(&self, txn: Option<&mut Txn<'_>>, key: &[u8]) -> StoreResult<()> {
        self.write(txn, |txn| txn.del(key))
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> StoreResult<bool> {
        self.contains_key_in(None, key)
    }

    /// [`LmdbDict::contains_key`] inside `txn` when given.
    pub fn contains_key_in(&self, txn: Option<&Txn<'_>>, key: &[u8]) -> StoreResult<bool> {
        self.read(txn, |txn| txn.contains_key(key))
    }

    /// Number of keys in the store.
    pub fn len(&self) -> StoreResult<usize> {
        self.len_in(None)
    }

    /// [`LmdbDict::len`] inside `txn` when given, counting its uncommitted
    /// writes.
    pub fn len_in(&self, txn: Option<&Txn<'_>>) -> StoreResult<usize> {
        self.read(txn, |txn| txn.len())
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterates over key-value pairs in key order, over a snapshot taken now.
    pub fn items(&self) -> StoreResult<Iter<'_, '_>> {
        self.items_in(None)
    }

    /// [`LmdbDict::items`] over `txn` when given.
    pub fn items_in<'t>(&'t self, txn: Option<&'t Txn<'t>>) -> StoreResult<Iter<'t, 't>> {
        match txn {
            Some(txn) => {
                self.check_txn(txn)?;
                Ok(txn.items())
            }
            None => Ok(Iter::owned(self.begin(false)?)),
        }
    }

    /// Iterates over keys in order, over a snapshot taken now.
    pub fn keys(&self) -> StoreResult<Keys<'_, '_>> {
        Ok(Keys::new(self.items()?))
    }

    /// Iterates over values in key order, over a snapshot taken now.
    pub fn values(&self) -> StoreResult<Values<'_, '_>> {
        Ok(Values::new(self.items()?))
    }

    /// Stores every pair in one write transaction.
    pub fn update<I, K, V>(&self, pairs: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.write(None, |txn| {
            pairs.into_iter().try_for_each(|(key, value)| txn.put(key.as_ref(), value.as_ref()))
        })
    }

    /// Removes `key` and returns its value, atomically.
    pub fn pop(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.write(None, |txn| txn.pop(key))
    }

    /// Removes every key in one write transaction.
    pub fn clear(&self) -> StoreResult<()> {
        self.write(None, |txn| txn.clear())
    }

    /// Forces buffered writes to disk. Does nothing on a closed or read-only
    /// handle.
    pub fn flush(&self) -> StoreResult<()> {
        self.env.as_ref().map_or(Ok(()), EnvHandle::sync)
    }

    /// Flushes and releases the environment.
    ///
    /// Calling `close` again does nothing. Later operations fail with
    /// [`StoreError::Closed`] until [`LmdbDict::reopen`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn close(&mut self) -> StoreResult<()> {
        self.env.take().map_or(Ok(()), EnvHandle::close)
    }

    /// Opens the environment again after [`LmdbDict::close`], with the same
    /// path, mode and options. Does nothing if already open.
    pub fn reopen(&mut self) -> StoreResult<()> {
        if self.env.is_none() {
            self.env = Some(EnvHandle::open(&self.path, self.mode, &self.options)?);
        }
        Ok(())
    }
}

impl Drop for LmdbDict {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), %err, "failed to close store on drop");
        }
    }
}
