use crate::{
    Mode, OpenFlags, StoreError, StoreResult,
    error::engine_io_error,
};
use lmdb::{Database, DatabaseFlags, Environment, RoTransaction, RwTransaction};
use parking_lot::Mutex;
use std::{
    fmt, fs, io,
    path::Path,
    thread::{self, ThreadId},
};
use tracing::{debug, instrument};

/// Default maximum map size, 10 MiB.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

/// Options applied when an environment is opened.
///
/// Everything here is forwarded to the engine without interpretation.
///
/// ```
/// use lmdb_simple::{OpenFlags, StoreOptions};
///
/// let mut options = StoreOptions::default();
/// options.set_map_size(1 << 30).set_flags(OpenFlags::NO_READAHEAD);
/// assert_eq!(options.map_size(), 1 << 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    map_size: usize,
    max_readers: Option<u32>,
    flags: OpenFlags,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { map_size: DEFAULT_MAP_SIZE, max_readers: None, flags: OpenFlags::empty() }
    }
}

impl StoreOptions {
    /// Sets the maximum size of the memory map, which bounds the size of the
    /// store. The engine rounds it to a multiple of the OS page size.
    pub const fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    /// Sets the maximum number of concurrent read transactions across all
    /// processes. Uses the engine default when unset.
    pub const fn set_max_readers(&mut self, max_readers: u32) -> &mut Self {
        self.max_readers = Some(max_readers);
        self
    }

    /// Sets engine tuning flags.
    pub const fn set_flags(&mut self, flags: OpenFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Maximum size of the memory map.
    pub const fn map_size(&self) -> usize {
        self.map_size
    }

    /// Maximum number of readers, if set.
    pub const fn max_readers(&self) -> Option<u32> {
        self.max_readers
    }

    /// Engine tuning flags.
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }
}

/// An open environment and its default database.
pub(crate) struct EnvHandle {
    env: Environment,
    db: Database,
    mode: Mode,
    /// Thread currently holding this handle's write transaction.
    writer: Mutex<Option<ThreadId>>,
}

impl fmt::Debug for EnvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvHandle").field("mode", &self.mode).finish_non_exhaustive()
    }
}

impl EnvHandle {
    /// Opens the environment at `path`.
    ///
    /// In write mode the store directory is created if missing. Its parent
    /// is never created.
    #[instrument(skip(mode, options), fields(mode = mode.label()))]
    pub(crate) fn open(path: &Path, mode: Mode, options: &StoreOptions) -> StoreResult<Self> {
        let open_err = |source: io::Error| StoreError::Open { path: path.to_path_buf(), source };

        if mode.is_read_write() && !options.flags.contains(OpenFlags::NO_SUB_DIR) {
            match fs::create_dir(path) {
                Ok(()) => debug!("created store directory"),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(open_err(err)),
            }
        }

        let mut builder = Environment::new();
        builder.set_flags(options.flags.to_env_flags(mode));
        builder.set_map_size(options.map_size);
        if let Some(max_readers) = options.max_readers {
            builder.set_max_readers(max_readers);
        }
        let env = builder.open(path).map_err(|err| open_err(engine_io_error(err)))?;

        let db = match mode {
            Mode::ReadOnly => env.open_db(None),
            Mode::ReadWrite => env.create_db(None, DatabaseFlags::empty()),
        }
        .map_err(|err| open_err(engine_io_error(err)))?;

        debug!("environment open");
        Ok(Self { env, db, mode, writer: Mutex::new(None) })
    }

    pub(crate) const fn db(&self) -> Database {
        self.db
    }

    pub(crate) fn begin_ro(&self) -> StoreResult<RoTransaction<'_>> {
        Ok(self.env.begin_ro_txn()?)
    }

    /// Begins the write transaction and records the calling thread as its
    /// holder.
    ///
    /// Fails with [`StoreError::WriteInProgress`] instead of blocking when
    /// the calling thread already holds it, since the engine's writer lock
    /// is not reentrant.
    pub(crate) fn begin_rw(&self) -> StoreResult<(RwTransaction<'_>, WriterClaim<'_>)> {
        if self.mode.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let current = thread::current().id();
        if *self.writer.lock() == Some(current) {
            return Err(StoreError::WriteInProgress);
        }
        let txn = self.env.begin_rw_txn()?;
        *self.writer.lock() = Some(current);
        Ok((txn, WriterClaim { handle: self, thread: current }))
    }

    /// Flushes buffered writes to disk. A no-op for read-only handles, which
    /// the engine refuses to sync.
    pub(crate) fn sync(&self) -> StoreResult<()> {
        if self.mode.is_read_write() {
            self.env.sync(true)?;
        }
        Ok(())
    }

    /// Syncs and releases the environment. The environment is released even
    /// when the final sync fails.
    #[instrument(skip_all, fields(mode = self.mode.label()))]
    pub(crate) fn close(self) -> StoreResult<()> {
        let res = self.sync();
        drop(self);
        debug!("environment closed");
        res
    }
}

/// Clears the recorded writer thread when dropped.
pub(crate) struct WriterClaim<'env> {
    handle: &'env EnvHandle,
    thread: ThreadId,
}

impl Drop for WriterClaim<'_> {
    fn drop(&mut self) {
        let mut writer = self.handle.writer.lock();
        // The engine lock is released before the claim, so the next writer
        // may already have recorded itself.
        if *writer == Some(self.thread) {
            *writer = None;
        }
    }
}
