//! A byte-keyed mapping on top of [LMDB], with read-only worker pools.
//!
//! # Overview
//!
//! [`LmdbDict`] binds one LMDB environment to a directory on disk and exposes
//! it as a mapping from byte keys to byte values. Every single-key call runs
//! in its own short transaction. [`LmdbDict::transaction`] groups several
//! calls into one all-or-nothing unit that commits when the closure returns
//! `Ok` and aborts on `Err` or panic.
//!
//! [`ReaderPool`] shares read access to a store across processes. Each
//! worker process opens its own read-only handle when it starts and serves
//! lookups from it until the pool is closed.
//!
//! # Quick Start
//!
//! ```no_run
//! use lmdb_simple::{LmdbDict, Mode, StoreOptions, StoreResult, make_reader_pool};
//!
//! fn main() -> StoreResult<()> {
//!     let mut options = StoreOptions::default();
//!     options.set_map_size(1 << 30);
//!
//!     // Create the store and write through a transaction.
//!     let mut dict = LmdbDict::open("/tmp/my_store", Mode::ReadWrite, &options)?;
//!     dict.transaction(true, |txn| {
//!         txn.put(b"foo", b"bar")?;
//!         txn.put(b"hello", b"world")
//!     })?;
//!     dict.close()?;
//!
//!     // Read it back from four worker processes.
//!     let mut pool = make_reader_pool("/tmp/my_store", 4, &options)?;
//!     let values = pool.map(&[b"foo".as_slice(), b"hello"])?;
//!     assert_eq!(values, [b"bar".to_vec(), b"world".to_vec()]);
//!     pool.close()?;
//!     pool.join()
//! }
//! ```
//!
//! # Key Concepts
//!
//! - [`LmdbDict`] - one environment handle, opened [`Mode::ReadOnly`] (the
//!   default) or [`Mode::ReadWrite`].
//! - [`Txn`] - a transaction guard. Dropping it without
//!   [`Txn::commit`] aborts.
//! - [`Iter`], [`Keys`], [`Values`] - lazy iteration in byte order over a
//!   snapshot fixed when the iterator is created.
//! - [`ReaderPool`] - worker processes, each with its own read-only handle.
//! - [`StoreError`] - every failure, surfaced without retries.
//!
//! # Logging
//!
//! Transactions, environment open/close and pool lifecycle emit [`tracing`]
//! events under the `lmdb_simple` target. No subscriber is installed.
//!
//! [LMDB]: http://www.lmdb.tech/doc/

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate lmdb_sys as ffi;

mod dict;
pub use dict::LmdbDict;

mod error;
pub use error::{StoreError, StoreResult};

mod flags;
pub use flags::{Mode, OpenFlags};

pub mod pool;
pub use pool::{ReaderPool, WorkerRegistration, init_reader, lookup, make_reader_pool};

pub mod sys;
pub use sys::{DEFAULT_MAP_SIZE, StoreOptions};

pub mod tx;
pub use tx::{Iter, Keys, Txn, Values};
