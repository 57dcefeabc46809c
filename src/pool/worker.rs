use crate::{
    LmdbDict, Mode, StoreError, StoreOptions, StoreResult,
    pool::wire::{Failure, Reply, Request},
};
use parking_lot::Mutex;
use std::{
    io::{self, BufReader, PipeReader, PipeWriter},
    os::fd::{AsRawFd, RawFd},
    panic::{self, AssertUnwindSafe},
    path::Path,
    process,
};
use tracing::debug;

/// Process-local state of a pool worker: the one read-only handle it owns
/// for its whole life.
#[derive(Debug)]
pub struct WorkerRegistration {
    reader: LmdbDict,
}

impl WorkerRegistration {
    /// The worker's read-only handle.
    pub const fn reader(&self) -> &LmdbDict {
        &self.reader
    }

    /// Closes the handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.reader.close()
    }
}

/// Opens the read-only handle a pool worker serves from.
///
/// Runs in each worker right after it starts, before it accepts work.
pub fn init_reader(path: impl AsRef<Path>, options: &StoreOptions) -> StoreResult<WorkerRegistration> {
    let reader = LmdbDict::open(path, Mode::ReadOnly, options)?;
    debug!(pid = process::id(), "worker reader open");
    Ok(WorkerRegistration { reader })
}

struct Channel {
    requests: PipeWriter,
    replies: BufReader<PipeReader>,
}

impl Channel {
    fn recv(&mut self) -> io::Result<Reply> {
        Reply::read_from(&mut self.replies)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "worker closed its reply channel")
        })
    }
}

/// Coordinator-side handle to one forked worker.
pub(crate) struct WorkerProc {
    pid: libc::pid_t,
    /// Raw descriptors of the channel, closed in later-forked siblings.
    fds: [RawFd; 2],
    channel: Mutex<Channel>,
}

impl core::fmt::Debug for WorkerProc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerProc").field("pid", &self.pid).finish_non_exhaustive()
    }
}

impl WorkerProc {
    /// Forks a worker that opens its own reader at `path` and answers calls
    /// with `worker`.
    ///
    /// `inherited` lists descriptors of sibling workers; the child closes
    /// them so each channel has exactly one process at either end.
    pub(crate) fn spawn<F>(
        path: &Path,
        options: &StoreOptions,
        worker: &F,
        inherited: &[RawFd],
    ) -> StoreResult<Self>
    where
        F: Fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>,
    {
        let (req_r, req_w) = io::pipe().map_err(|err| StoreError::worker(0, err))?;
        let (rep_r, rep_w) = io::pipe().map_err(|err| StoreError::worker(0, err))?;

        // SAFETY: the child only uses state it owns and leaves through
        // `_exit`, never returning into the caller's frames.
        match unsafe { libc::fork() } {
            -1 => Err(StoreError::worker(0, io::Error::last_os_error())),
            0 => {
                drop(req_w);
                drop(rep_r);
                for fd in inherited {
                    // SAFETY: these descriptors belong to sibling channels
                    // whose owning objects are never used in the child.
                    unsafe { libc::close(*fd) };
                }
                child_main(path, options, worker, req_r, rep_w)
            }
            pid => {
                drop(req_r);
                drop(rep_w);
                debug!(pid, "spawned worker");
                Ok(Self {
                    pid,
                    fds: [req_w.as_raw_fd(), rep_r.as_raw_fd()],
                    channel: Mutex::new(Channel { requests: req_w, replies: BufReader::new(rep_r) }),
                })
            }
        }
    }

    pub(crate) const fn pid(&self) -> libc::pid_t {
        self.pid
    }

    pub(crate) const fn raw_fds(&self) -> [RawFd; 2] {
        self.fds
    }

    fn ipc_error(&self, err: io::Error) -> StoreError {
        StoreError::worker(self.pid, err)
    }

    /// Waits for the worker to report that its reader is open.
    pub(crate) fn await_ready(&self) -> StoreResult<()> {
        match self.channel.lock().recv().map_err(|err| self.ipc_error(err))? {
            Reply::Ready => Ok(()),
            Reply::Failed(failure) => Err(failure.into_error(self.pid)),
            Reply::Value(_) => Err(self.ipc_error(io::Error::other("unexpected value during startup"))),
        }
    }

    /// Runs the worker function on `key` and waits for the result.
    pub(crate) fn call(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        let mut channel = self.channel.lock();
        Request::Call(key.to_vec())
            .write_to(&mut channel.requests)
            .map_err(|err| self.ipc_error(err))?;
        match channel.recv().map_err(|err| self.ipc_error(err))? {
            Reply::Value(value) => Ok(value),
            Reply::Failed(failure) => Err(failure.into_error(self.pid)),
            Reply::Ready => Err(self.ipc_error(io::Error::other("unexpected ready frame"))),
        }
    }

    /// Asks the worker to close its reader and exit.
    pub(crate) fn request_shutdown(&self) -> StoreResult<()> {
        Request::Shutdown.write_to(&mut self.channel.lock().requests).map_err(|err| self.ipc_error(err))
    }

    /// Reaps the worker. Fails unless it exited with status 0.
    pub(crate) fn wait(self) -> StoreResult<()> {
        let status = self.reap()?;
        if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 {
            debug!(pid = self.pid, "worker exited");
            Ok(())
        } else {
            Err(self.ipc_error(io::Error::other(format!("worker ended with wait status {status}"))))
        }
    }

    /// Kills and reaps the worker.
    pub(crate) fn kill(self) -> StoreResult<()> {
        // SAFETY: pid is an unreaped child of this process.
        if unsafe { libc::kill(self.pid, libc::SIGKILL) } == -1 {
            return Err(self.ipc_error(io::Error::last_os_error()));
        }
        self.reap().map(drop)
    }

    fn reap(&self) -> StoreResult<libc::c_int> {
        let mut status = 0;
        loop {
            // SAFETY: status is a valid out pointer.
            if unsafe { libc::waitpid(self.pid, &mut status, 0) } != -1 {
                return Ok(status);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(self.ipc_error(err));
            }
        }
    }
}

/// Entry point of a forked worker. Never returns.
fn child_main<F>(
    path: &Path,
    options: &StoreOptions,
    worker: &F,
    requests: PipeReader,
    replies: PipeWriter,
) -> !
where
    F: Fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>,
{
    let code = match panic::catch_unwind(AssertUnwindSafe(|| {
        serve(path, options, worker, requests, replies)
    })) {
        Ok(Ok(())) => 0,
        Ok(Err(_)) => 1,
        Err(_) => 101,
    };
    // SAFETY: ends the child without running the parent's destructors.
    unsafe { libc::_exit(code) }
}

fn serve<F>(
    path: &Path,
    options: &StoreOptions,
    worker: &F,
    requests: PipeReader,
    mut replies: PipeWriter,
) -> io::Result<()>
where
    F: Fn(&LmdbDict, &[u8]) -> StoreResult<Vec<u8>>,
{
    let mut requests = BufReader::new(requests);
    let registration = match init_reader(path, options) {
        Ok(registration) => registration,
        Err(err) => {
            Reply::from(Failure::from(&err)).write_to(&mut replies)?;
            return Err(io::Error::other(err));
        }
    };
    Reply::Ready.write_to(&mut replies)?;

    while let Some(request) = Request::read_from(&mut requests)? {
        let Request::Call(key) = request else { break };
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| worker(registration.reader(), &key))) {
            Ok(Ok(value)) => Reply::Value(value),
            Ok(Err(err)) => Failure::from(&err).into(),
            Err(_) => Failure::Other("worker function panicked".into()).into(),
        };
        reply.write_to(&mut replies)?;
    }

    registration.close().map_err(io::Error::other)
}
