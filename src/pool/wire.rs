//! Frames exchanged between a pool and its workers.
//!
//! Every frame is a big-endian `u32` length followed by that many bytes: a
//! tag byte, then the payload.

use crate::StoreError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    ffi::OsStr,
    io::{self, Read, Write},
    os::{raw::c_int, unix::ffi::OsStrExt},
    path::PathBuf,
};

/// Upper bound on a frame body. Values are capped by the map size long
/// before this.
const MAX_FRAME: u32 = 1 << 30;

const TAG_CALL: u8 = 1;
const TAG_SHUTDOWN: u8 = 2;
const TAG_READY: u8 = 3;
const TAG_VALUE: u8 = 4;
const TAG_FAILED: u8 = 5;

const FAIL_KEY_NOT_FOUND: u8 = 1;
const FAIL_READ_ONLY: u8 = 2;
const FAIL_STORAGE: u8 = 3;
const FAIL_OPEN: u8 = 4;
const FAIL_INVALID_ARGUMENT: u8 = 5;
const FAIL_CLOSED: u8 = 6;
const FAIL_OTHER: u8 = 7;

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

/// Writes one frame with a single `write_all`.
fn write_frame<W: Write>(w: &mut W, tag: u8, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len() + 1)
        .ok()
        .filter(|len| *len <= MAX_FRAME)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    let mut buf = Vec::with_capacity(payload.len() + 5);
    buf.write_u32::<BigEndian>(len)?;
    buf.write_u8(tag)?;
    buf.extend_from_slice(payload);
    w.write_all(&buf)?;
    w.flush()
}

/// Reads one frame. Returns `None` if the stream ends before a new frame.
fn read_frame<R: Read>(r: &mut R) -> io::Result<Option<(u8, Vec<u8>)>> {
    let len = match r.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };
    if len == 0 || len > MAX_FRAME {
        return Err(invalid_data("bad frame length"));
    }
    let tag = r.read_u8()?;
    let mut payload = vec![0; len as usize - 1];
    r.read_exact(&mut payload)?;
    Ok(Some((tag, payload)))
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| invalid_data("field too large"))?;
    buf.write_u32::<BigEndian>(len)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn take_bytes(r: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > r.len() {
        return Err(invalid_data("truncated field"));
    }
    let (bytes, rest) = r.split_at(len);
    *r = rest;
    Ok(bytes.to_vec())
}

fn take_string(r: &mut &[u8]) -> io::Result<String> {
    String::from_utf8(take_bytes(r)?).map_err(|_| invalid_data("field is not utf-8"))
}

/// Coordinator to worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    /// Run the worker function on a key.
    Call(Vec<u8>),
    /// Close the reader and exit.
    Shutdown,
}

impl Request {
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Call(key) => write_frame(w, TAG_CALL, key),
            Self::Shutdown => write_frame(w, TAG_SHUTDOWN, &[]),
        }
    }

    pub(crate) fn read_from<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let Some((tag, payload)) = read_frame(r)? else { return Ok(None) };
        match tag {
            TAG_CALL => Ok(Some(Self::Call(payload))),
            TAG_SHUTDOWN => Ok(Some(Self::Shutdown)),
            _ => Err(invalid_data("unknown request tag")),
        }
    }
}

/// Worker to coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    /// The reader is open and the worker accepts calls.
    Ready,
    /// A call succeeded.
    Value(Vec<u8>),
    /// Startup or a call failed.
    Failed(Failure),
}

impl Reply {
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Ready => write_frame(w, TAG_READY, &[]),
            Self::Value(value) => write_frame(w, TAG_VALUE, value),
            Self::Failed(failure) => write_frame(w, TAG_FAILED, &failure.encode()?),
        }
    }

    pub(crate) fn read_from<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let Some((tag, payload)) = read_frame(r)? else { return Ok(None) };
        match tag {
            TAG_READY => Ok(Some(Self::Ready)),
            TAG_VALUE => Ok(Some(Self::Value(payload))),
            TAG_FAILED => Failure::decode(&payload).map(|failure| Some(Self::Failed(failure))),
            _ => Err(invalid_data("unknown reply tag")),
        }
    }
}

impl From<Failure> for Reply {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

/// A [`StoreError`] flattened for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    KeyNotFound(Vec<u8>),
    ReadOnly,
    /// Engine error code.
    Storage(c_int),
    Open { path: PathBuf, os_code: Option<i32>, message: String },
    InvalidArgument(String),
    Closed,
    /// Anything else, including a panicking worker function.
    Other(String),
}

impl From<&StoreError> for Failure {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => Self::KeyNotFound(key.clone()),
            StoreError::ReadOnly => Self::ReadOnly,
            StoreError::Storage(err) => Self::Storage(err.to_err_code()),
            StoreError::Open { path, source } => Self::Open {
                path: path.clone(),
                os_code: source.raw_os_error(),
                message: source.to_string(),
            },
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg.clone()),
            StoreError::Closed => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Failure {
    /// Rebuilds the error on the coordinator side. `pid` attributes
    /// failures that have no variant of their own.
    pub(crate) fn into_error(self, pid: i32) -> StoreError {
        match self {
            Self::KeyNotFound(key) => StoreError::KeyNotFound(key),
            Self::ReadOnly => StoreError::ReadOnly,
            Self::Storage(code) => StoreError::Storage(lmdb::Error::from_err_code(code)),
            Self::Open { path, os_code, message } => StoreError::Open {
                path,
                source: os_code.map_or_else(|| io::Error::other(message), io::Error::from_raw_os_error),
            },
            Self::InvalidArgument(msg) => StoreError::InvalidArgument(msg),
            Self::Closed => StoreError::Closed,
            Self::Other(msg) => StoreError::worker(pid, io::Error::other(msg)),
        }
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::KeyNotFound(key) => {
                buf.write_u8(FAIL_KEY_NOT_FOUND)?;
                put_bytes(&mut buf, key)?;
            }
            Self::ReadOnly => buf.write_u8(FAIL_READ_ONLY)?,
            Self::Storage(code) => {
                buf.write_u8(FAIL_STORAGE)?;
                buf.write_i32::<BigEndian>(*code)?;
            }
            Self::Open { path, os_code, message } => {
                buf.write_u8(FAIL_OPEN)?;
                put_bytes(&mut buf, path.as_os_str().as_bytes())?;
                // 0 is never a valid errno.
                buf.write_i32::<BigEndian>(os_code.unwrap_or(0))?;
                put_bytes(&mut buf, message.as_bytes())?;
            }
            Self::InvalidArgument(msg) => {
                buf.write_u8(FAIL_INVALID_ARGUMENT)?;
                put_bytes(&mut buf, msg.as_bytes())?;
            }
            Self::Closed => buf.write_u8(FAIL_CLOSED)?,
            Self::Other(msg) => {
                buf.write_u8(FAIL_OTHER)?;
                put_bytes(&mut buf, msg.as_bytes())?;
            }
        }
        Ok(buf)
    }

    fn decode(mut payload: &[u8]) -> io::Result<Self> {
        let r = &mut payload;
        let failure = match r.read_u8()? {
            FAIL_KEY_NOT_FOUND => Self::KeyNotFound(take_bytes(r)?),
            FAIL_READ_ONLY => Self::ReadOnly,
            FAIL_STORAGE => Self::Storage(r.read_i32::<BigEndian>()?),
            FAIL_OPEN => {
                let path = PathBuf::from(OsStr::from_bytes(&take_bytes(r)?));
                let os_code = Some(r.read_i32::<BigEndian>()?).filter(|code| *code != 0);
                Self::Open { path, os_code, message: take_string(r)? }
            }
            FAIL_INVALID_ARGUMENT => Self::InvalidArgument(take_string(r)?),
            FAIL_CLOSED => Self::Closed,
            FAIL_OTHER => Self::Other(take_string(r)?),
            _ => return Err(invalid_data("unknown failure kind")),
        };
        Ok(failure)
    }
}
