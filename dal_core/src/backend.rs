//! Backend capability traits.
//!
//! A backend is a storage driver that can hand out byte sources and byte
//! sinks for paths inside its own namespace. The core never interprets the
//! path beyond scheme stripping; everything after that is backend territory.
//!
//! Backends may be network-bound or chunked internally, which is why the
//! traits are async. The synchronous facade is built on top of them by the
//! service and the blocking port.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A storage driver: opens byte sources for existing objects and byte sinks
/// for new objects.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open an existing object for streaming reads.
    ///
    /// # Errors
    /// `NotFound`, `PermissionDenied` or `Unavailable`, as reported by the
    /// driver.
    async fn open_read(&self, path: &str) -> Result<Box<dyn ByteSource>>;

    /// Create a new object for streaming writes.
    ///
    /// The object must not become observable at `path` until the sink's
    /// `finalize` succeeds.
    async fn open_write(&self, path: &str) -> Result<Box<dyn ByteSink>>;
}

/// A lazy, finite sequence of byte chunks.
///
/// Chunk sizes are chosen by the driver and carry no meaning. There is no
/// rewind; restarting means re-opening the object.
#[async_trait]
pub trait ByteSource: Send {
    /// Produce the next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// An ordered byte sink with an explicit durability point.
#[async_trait]
pub trait ByteSink: Send {
    /// Accept up to `data.len()` bytes, returning the count actually taken.
    async fn accept(&mut self, data: &[u8]) -> Result<usize>;

    /// Make all previously accepted bytes durable, atomically.
    ///
    /// Either the whole object becomes observable or the call fails and
    /// nothing is published. Called exactly once, at handle close.
    async fn finalize(&mut self) -> Result<()>;
}
