use crate::{
    StoreResult,
    tx::{ops::Position, txn::Txn},
};
use core::fmt;
use std::{iter::FusedIterator, mem};

/// The transaction an iterator reads through.
enum Snapshot<'t, 'env> {
    /// A read transaction begun for this iterator alone.
    Owned(Txn<'env>),
    /// A caller's transaction.
    Borrowed(&'t Txn<'env>),
    /// The owned transaction has been ended.
    Released,
}

/// Lazy iterator over the key-value pairs of a store, in byte-lexicographic
/// key order.
///
/// The view is fixed when the iterator is created: writes committed after
/// that point are not observed. An iterator created by
/// [`LmdbDict::items`] holds its own read transaction, which ends as soon as
/// the iterator is exhausted or dropped.
///
/// Each entry is copied out of the store, so a thread may keep an iterator
/// alive while reading and writing through other transactions.
///
/// [`LmdbDict::items`]: crate::LmdbDict::items
pub struct Iter<'t, 'env> {
    snapshot: Snapshot<'t, 'env>,
    /// `None` once exhausted.
    position: Option<Position>,
}

impl fmt::Debug for Iter<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("position", &self.position).finish_non_exhaustive()
    }
}

impl<'t, 'env> Iter<'t, 'env> {
    pub(crate) const fn owned(txn: Txn<'env>) -> Self {
        Self { snapshot: Snapshot::Owned(txn), position: Some(Position::Start) }
    }

    pub(crate) const fn borrowed(txn: &'t Txn<'env>) -> Self {
        Self { snapshot: Snapshot::Borrowed(txn), position: Some(Position::Start) }
    }

    fn finish(&mut self) {
        self.position = None;
        if let Snapshot::Owned(txn) = mem::replace(&mut self.snapshot, Snapshot::Released) {
            txn.abort();
        }
    }
}

impl Iterator for Iter<'_, '_> {
    type Item = StoreResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.position.as_ref()?;
        let txn = match &self.snapshot {
            Snapshot::Owned(txn) => txn,
            Snapshot::Borrowed(txn) => *txn,
            Snapshot::Released => return None,
        };

        match txn.next_entry(position) {
            Ok(Some((key, value))) => {
                self.position = Some(Position::After(key.clone()));
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Iter<'_, '_> {}

/// Lazy iterator over the keys of a store. See [`Iter`].
#[derive(Debug)]
pub struct Keys<'t, 'env>(Iter<'t, 'env>);

impl<'t, 'env> Keys<'t, 'env> {
    pub(crate) const fn new(inner: Iter<'t, 'env>) -> Self {
        Self(inner)
    }
}

impl Iterator for Keys<'_, '_> {
    type Item = StoreResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|res| res.map(|(key, _)| key))
    }
}

impl FusedIterator for Keys<'_, '_> {}

/// Lazy iterator over the values of a store, in key order. See [`Iter`].
#[derive(Debug)]
pub struct Values<'t, 'env>(Iter<'t, 'env>);

impl<'t, 'env> Values<'t, 'env> {
    pub(crate) const fn new(inner: Iter<'t, 'env>) -> Self {
        Self(inner)
    }
}

impl Iterator for Values<'_, '_> {
    type Item = StoreResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|res| res.map(|(_, value)| value))
    }
}

impl FusedIterator for Values<'_, '_> {}
