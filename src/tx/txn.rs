use crate::{
    StoreError, StoreResult,
    sys::{EnvHandle, WriterClaim},
    tx::{
        iter::{Iter, Keys, Values},
        ops::{self, Position},
    },
};
use core::fmt;
use lmdb::{RoTransaction, RwTransaction, Transaction, WriteFlags};
use std::ptr;
use tracing::{debug, debug_span, instrument};

/// The engine transaction behind a [`Txn`].
enum RawTxn<'env> {
    Ro(RoTransaction<'env>),
    Rw(RwTransaction<'env>, WriterClaim<'env>),
}

/// Runs `$body` with `$txn` bound to whichever engine transaction `$raw`
/// holds.
macro_rules! with_raw {
    ($raw:expr, $txn:ident => $body:expr) => {
        match $raw {
            RawTxn::Ro($txn) => $body,
            RawTxn::Rw($txn, _) => $body,
        }
    };
}

impl RawTxn<'_> {
    fn commit(self) -> StoreResult<()> {
        match self {
            Self::Ro(txn) => txn.commit()?,
            Self::Rw(txn, _claim) => txn.commit()?,
        }
        Ok(())
    }

    fn abort(self) {
        match self {
            Self::Ro(txn) => txn.abort(),
            Self::Rw(txn, _claim) => txn.abort(),
        }
    }
}

/// A transaction against a store.
///
/// Obtained from [`LmdbDict::begin`], or handed to the closure passed to
/// [`LmdbDict::transaction`]. A read-write transaction is committed by
/// [`Txn::commit`]; dropping a transaction without committing aborts it, so
/// none of its writes become visible.
///
/// Reads inside a transaction observe a consistent snapshot taken when it
/// began, plus the transaction's own writes.
///
/// [`LmdbDict::begin`]: crate::LmdbDict::begin
/// [`LmdbDict::transaction`]: crate::LmdbDict::transaction
pub struct Txn<'env> {
    /// `None` once committed or aborted.
    raw: Option<RawTxn<'env>>,
    handle: &'env EnvHandle,
    span: tracing::Span,
}

impl fmt::Debug for Txn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn").field("write", &self.is_write()).finish_non_exhaustive()
    }
}

impl<'env> Txn<'env> {
    pub(crate) fn begin(handle: &'env EnvHandle, write: bool) -> StoreResult<Self> {
        let kind = if write { "rw" } else { "ro" };
        let span = debug_span!(target: "lmdb_simple", "txn", kind);
        let raw = if write {
            let (txn, claim) = handle.begin_rw()?;
            RawTxn::Rw(txn, claim)
        } else {
            RawTxn::Ro(handle.begin_ro()?)
        };
        span.in_scope(|| debug!("begun"));
        Ok(Self { raw: Some(raw), handle, span })
    }

    /// Returns `true` for a read-write transaction.
    pub fn is_write(&self) -> bool {
        matches!(self.raw, Some(RawTxn::Rw(..)))
    }

    /// Returns the tracing span for this transaction.
    #[inline(always)]
    pub const fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Returns `true` if this transaction was begun on `handle`.
    pub(crate) fn belongs_to(&self, handle: &EnvHandle) -> bool {
        ptr::eq(self.handle, handle)
    }

    fn raw(&self) -> StoreResult<&RawTxn<'env>> {
        self.raw.as_ref().ok_or(StoreError::Closed)
    }

    fn writer(&mut self) -> StoreResult<&mut RwTransaction<'env>> {
        match self.raw.as_mut().ok_or(StoreError::Closed)? {
            RawTxn::Rw(txn, _) => Ok(txn),
            RawTxn::Ro(_) => Err(StoreError::ReadOnly),
        }
    }

    /// Looks up `key`, borrowing the value from the transaction.
    pub fn get_ref(&self, key: &[u8]) -> StoreResult<Option<&[u8]>> {
        let db = self.handle.db();
        match with_raw!(self.raw()?, txn => txn.get(db, &key)) {
            Ok(value) => Ok(Some(value)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Looks up `key`. Fails with [`StoreError::KeyNotFound`] if absent.
    pub fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.get_ref(key)?
            .map(<[u8]>::to_vec)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_vec()))
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get_ref(key)?.is_some())
    }

    /// Number of keys visible to this transaction.
    pub fn len(&self) -> StoreResult<usize> {
        let db = self.handle.db();
        with_raw!(self.raw()?, txn => ops::entries(txn, db))
    }

    /// Returns `true` if no keys are visible to this transaction.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let db = self.handle.db();
        self.writer()?.put(db, &key, &value, WriteFlags::empty())?;
        Ok(())
    }

    /// Removes `key`. Fails with [`StoreError::KeyNotFound`] if absent.
    pub fn del(&mut self, key: &[u8]) -> StoreResult<()> {
        let db = self.handle.db();
        match self.writer()?.del(db, &key, None) {
            Ok(()) => Ok(()),
            Err(lmdb::Error::NotFound) => Err(StoreError::KeyNotFound(key.to_vec())),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes `key` and returns its value.
    pub fn pop(&mut self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.writer()?;
        let value = self.get(key)?;
        self.del(key)?;
        Ok(value)
    }

    /// Removes every key.
    pub fn clear(&mut self) -> StoreResult<()> {
        let db = self.handle.db();
        self.writer()?.clear_db(db)?;
        Ok(())
    }

    /// Iterates over key-value pairs visible to this transaction, in key
    /// order.
    pub fn items(&self) -> Iter<'_, 'env> {
        Iter::borrowed(self)
    }

    /// Iterates over keys visible to this transaction, in key order.
    pub fn keys(&self) -> Keys<'_, 'env> {
        Keys::new(self.items())
    }

    /// Iterates over values visible to this transaction, in key order.
    pub fn values(&self) -> Values<'_, 'env> {
        Values::new(self.items())
    }

    pub(crate) fn next_entry(&self, from: &Position) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        let db = self.handle.db();
        with_raw!(self.raw()?, txn => ops::next_entry(txn, db, from))
    }

    /// Commits the transaction. For a read-only transaction this simply ends
    /// it.
    ///
    /// If the engine fails to commit, the transaction is discarded and none
    /// of its writes are visible.
    #[instrument(skip(self), parent = &self.span)]
    pub fn commit(mut self) -> StoreResult<()> {
        if let Some(raw) = self.raw.take() {
            raw.commit()?;
            debug!("committed");
        }
        Ok(())
    }

    /// Aborts the transaction, discarding its writes.
    #[instrument(skip(self), parent = &self.span)]
    pub fn abort(mut self) {
        if let Some(raw) = self.raw.take() {
            raw.abort();
            debug!("aborted");
        }
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            let _entered = self.span.enter();
            raw.abort();
            debug!("aborted on drop");
        }
    }
}
