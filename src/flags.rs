use bitflags::bitflags;
use lmdb::EnvironmentFlags;

/// Access mode of a store handle.
///
/// Handles are read-only unless write access is requested. At most one
/// process should hold a read-write handle to a store at any time; the engine
/// serializes writers, this crate does not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Open an existing store for reading only.
    #[default]
    ReadOnly,
    /// Open for reading and writing, creating the store if it is missing.
    ReadWrite,
}

impl Mode {
    /// Returns `true` for [`Mode::ReadOnly`].
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    /// Returns `true` for [`Mode::ReadWrite`].
    pub const fn is_read_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

impl From<bool> for Mode {
    /// `true` selects [`Mode::ReadWrite`].
    fn from(write: bool) -> Self {
        if write { Self::ReadWrite } else { Self::ReadOnly }
    }
}

bitflags! {
    /// Engine tuning flags.
    ///
    /// The bits are LMDB's own `MDB_*` environment flags and are handed to the
    /// engine unchanged. Read-only access and thread-local reader slots are
    /// controlled by [`Mode`] and are not part of this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Use a fixed address for the memory map.
        const FIXED_MAP = ffi::MDB_FIXEDMAP;
        /// The path names a single data file rather than a directory.
        const NO_SUB_DIR = ffi::MDB_NOSUBDIR;
        /// Don't flush system buffers on commit.
        const NO_SYNC = ffi::MDB_NOSYNC;
        /// Flush system buffers on commit, but omit the metadata flush.
        const NO_META_SYNC = ffi::MDB_NOMETASYNC;
        /// Use a writeable memory map.
        const WRITE_MAP = ffi::MDB_WRITEMAP;
        /// Use asynchronous msync when [`OpenFlags::WRITE_MAP`] is set.
        const MAP_ASYNC = ffi::MDB_MAPASYNC;
        /// Don't do any locking. The caller manages concurrency.
        const NO_LOCK = ffi::MDB_NOLOCK;
        /// Turn off readahead.
        const NO_READAHEAD = ffi::MDB_NORDAHEAD;
        /// Don't initialize malloc'd memory before writing to datafile.
        const NO_MEM_INIT = ffi::MDB_NOMEMINIT;
    }
}

impl OpenFlags {
    /// Builds the engine flag set for the given mode.
    ///
    /// `NO_TLS` is always set so one thread may hold an iteration snapshot
    /// while performing other reads and writes.
    pub(crate) fn to_env_flags(self, mode: Mode) -> EnvironmentFlags {
        let mut flags = EnvironmentFlags::from_bits_truncate(self.bits());
        flags.insert(EnvironmentFlags::NO_TLS);
        if mode.is_read_only() {
            flags.insert(EnvironmentFlags::READ_ONLY);
        }
        flags
    }
}
