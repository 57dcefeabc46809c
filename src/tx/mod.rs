//! Transactions and lazy views over a store.
//!
//! - [`Txn`] - a read-only or read-write transaction guard
//! - [`Iter`], [`Keys`], [`Values`] - ordered iteration over a snapshot

mod iter;
pub use iter::{Iter, Keys, Values};

/// Raw engine calls.
pub(crate) mod ops;

mod txn;
pub use txn::Txn;
