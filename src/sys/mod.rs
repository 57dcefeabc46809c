//! Environment internals: opening, syncing and releasing the engine handle.

mod environment;
pub(crate) use environment::{EnvHandle, WriterClaim};
pub use environment::{DEFAULT_MAP_SIZE, StoreOptions};
