//! Read-only access to one store from several worker processes.
//!
//! A [`ReaderPool`] forks a fixed number of workers. Each opens its own
//! read-only [`LmdbDict`] on startup through [`init_reader`], keeps it for
//! its whole life, and answers lookups sent over a pipe. Handles never cross
//! a process boundary.
//!
//! ```no_run
//! use lmdb_simple::{StoreResult, make_reader_pool};
//!
//! # fn main() -> StoreResult<()> {
//! let mut pool = make_reader_pool("/tmp/dict", 4, &Default::default())?;
//! let values = pool.map(&[b"foo".as_slice(), b"hello"])?;
//! pool.close()?;
//! pool.join()
//! # }
//! ```

mod wire;

mod worker;
pub use worker::{WorkerRegistration, init_reader};
use worker::WorkerProc;

use crate::{LmdbDict, StoreError, StoreOptions, StoreResult};
use std::{
    os::fd::RawFd,
    panic,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};
use tracing::{debug, instrument, warn};

/// Signature of a worker body: the worker's own handle, then the key.
pub type WorkerFn = fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>;

/// The default worker body: looks `key` up in the worker's handle.
pub fn lookup(reader: &LmdbDict, key: &[u8]) -> StoreResult<Vec<u8>> {
    reader.get(key)
}

/// Starts a pool of `processes` workers serving [`lookup`] from the store at
/// `path`.
pub fn make_reader_pool(
    path: impl AsRef<Path>,
    processes: usize,
    options: &StoreOptions,
) -> StoreResult<ReaderPool> {
    ReaderPool::with_worker(path, processes, options, lookup as WorkerFn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Running,
    /// Workers were told to exit but have not been reaped.
    Closed,
    Joined,
}

/// A fixed set of worker processes, each holding its own read-only handle
/// to the same store.
///
/// Lifecycle follows the usual pool protocol: [`ReaderPool::close`] stops
/// accepting work, then [`ReaderPool::join`] waits for the workers to exit.
/// Dropping a pool does both.
#[derive(Debug)]
pub struct ReaderPool {
    path: PathBuf,
    processes: usize,
    workers: Vec<WorkerProc>,
    next: AtomicUsize,
    state: PoolState,
}

impl ReaderPool {
    /// Starts `processes` workers that answer calls with `worker`.
    ///
    /// Returns once every worker has opened its reader. If any worker fails
    /// to start, all workers are stopped and the first failure is returned.
    ///
    /// Workers are forked without exec and run the worker body in a copy of
    /// this process. Locks held by other threads at fork time stay held in
    /// the child, including those of a tracing subscriber or the allocator.
    /// Build pools before installing a subscriber or starting other threads.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), processes = processes))]
    pub fn with_worker<F>(
        path: impl AsRef<Path>,
        processes: usize,
        options: &StoreOptions,
        worker: F,
    ) -> StoreResult<Self>
    where
        F: Fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>,
    {
        if processes == 0 {
            return Err(StoreError::InvalidArgument("processes must be at least 1".into()));
        }

        let mut pool = Self {
            path: path.as_ref().to_path_buf(),
            processes,
            workers: Vec::with_capacity(processes),
            next: AtomicUsize::new(0),
            state: PoolState::Running,
        };

        if let Err(err) = pool.start(options, &worker) {
            pool.terminate();
            return Err(err);
        }
        debug!("pool ready");
        Ok(pool)
    }

    fn start<F>(&mut self, options: &StoreOptions, worker: &F) -> StoreResult<()>
    where
        F: Fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>,
    {
        for _ in 0..self.processes {
            let inherited: Vec<RawFd> = self.workers.iter().flat_map(WorkerProc::raw_fds).collect();
            let spawned = WorkerProc::spawn(&self.path, options, worker, &inherited)?;
            self.workers.push(spawned);
        }
        self.workers.iter().try_for_each(WorkerProc::await_ready)
    }

    /// Path of the store the workers read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of worker processes.
    pub const fn processes(&self) -> usize {
        self.processes
    }

    /// Process ids of the workers still attached to the pool.
    pub fn pids(&self) -> Vec<i32> {
        self.workers.iter().map(WorkerProc::pid).collect()
    }

    fn ensure_running(&self) -> StoreResult<()> {
        match self.state {
            PoolState::Running => Ok(()),
            PoolState::Closed | PoolState::Joined => Err(StoreError::PoolClosed),
        }
    }

    /// Runs the worker body on `key` in one worker. Workers are picked in
    /// turn.
    pub fn apply(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.ensure_running()?;
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index].call(key)
    }

    /// Runs the worker body on every key, spread over all workers.
    ///
    /// Results come back in input order. If any key fails, the error for the
    /// earliest such key is returned.
    pub fn map<K>(&self, keys: &[K]) -> StoreResult<Vec<Vec<u8>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        self.ensure_running()?;
        let cursor = AtomicUsize::new(0);
        let cursor = &cursor;

        let mut results: Vec<(usize, StoreResult<Vec<u8>>)> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .workers
                .iter()
                .map(|worker| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(key) = keys.get(index) else { break };
                            done.push((index, worker.call(key.as_ref())));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });

        results.sort_unstable_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, res)| res).collect()
    }

    /// Stops accepting work and tells every worker to close its reader and
    /// exit. Does nothing if already closed.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn close(&mut self) -> StoreResult<()> {
        if self.state != PoolState::Running {
            return Ok(());
        }
        self.state = PoolState::Closed;

        let mut first_err = None;
        for worker in &self.workers {
            if let Err(err) = worker.request_shutdown() {
                warn!(pid = worker.pid(), %err, "failed to signal worker");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Waits for every worker to exit.
    ///
    /// Fails with [`StoreError::InvalidArgument`] unless the pool was closed
    /// first. Returns the first worker that did not exit cleanly.
    pub fn join(&mut self) -> StoreResult<()> {
        match self.state {
            PoolState::Running => {
                Err(StoreError::InvalidArgument("pool is still running".into()))
            }
            PoolState::Joined => Ok(()),
            PoolState::Closed => {
                self.state = PoolState::Joined;
                let mut first_err = None;
                for worker in self.workers.drain(..) {
                    if let Err(err) = worker.wait() {
                        first_err.get_or_insert(err);
                    }
                }
                debug!(path = %self.path.display(), "pool joined");
                first_err.map_or(Ok(()), Err)
            }
        }
    }

    /// Kills every worker without waiting for pending work.
    pub fn terminate(&mut self) {
        self.state = PoolState::Joined;
        for worker in self.workers.drain(..) {
            let pid = worker.pid();
            if let Err(err) = worker.kill() {
                warn!(pid, %err, "failed to kill worker");
            }
        }
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), %err, "failed to close reader pool on drop");
        }
        if let Err(err) = self.join() {
            warn!(path = %self.path.display(), %err, "failed to join reader pool on drop");
        }
    }
}
