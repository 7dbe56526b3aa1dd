//! Blocking port into the storage service.
//!
//! A `DalPort` is the sync-to-async bridge: every method sends one
//! `IoRequest` and parks the calling thread on the response oneshot until the
//! service answers. There is no polling, no callback, and no cancellation; a
//! call returns bytes, EOF, or an error.
//!
//! Must not be used from inside an async context (`blocking_recv` would
//! panic); the port exists precisely for plain threads at the boundary.

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::{Error, Result};
use crate::service::{ChannelId, IoRequest, SendableBuffer};

/// Cloneable blocking facade over the service request channel.
#[derive(Clone)]
pub struct DalPort {
    service_tx: mpsc::UnboundedSender<IoRequest>,
}

impl DalPort {
    #[must_use]
    pub fn new(service_tx: mpsc::UnboundedSender<IoRequest>) -> Self {
        Self { service_tx }
    }

    fn submit<T>(
        &self,
        request: IoRequest,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.service_tx
            .send(request)
            .map_err(|_| service_stopped())?;
        rx.blocking_recv().map_err(|_| service_stopped())?
    }

    /// Open a read stream for `path`.
    pub fn open_read(&self, path: &str) -> Result<ChannelId> {
        trace!(path = %path, "port open_read");
        let (tx, rx) = oneshot::channel();
        self.submit(
            IoRequest::OpenRead {
                path: path.to_string(),
                response: tx,
            },
            rx,
        )
    }

    /// Open a write stream for `path`.
    pub fn open_write(&self, path: &str) -> Result<ChannelId> {
        trace!(path = %path, "port open_write");
        let (tx, rx) = oneshot::channel();
        self.submit(
            IoRequest::OpenWrite {
                path: path.to_string(),
                response: tx,
            },
            rx,
        )
    }

    /// Read up to `buf.len()` bytes; `Ok(0)` is end of stream.
    pub fn read(&self, channel: ChannelId, buf: &mut [u8]) -> Result<usize> {
        trace!(channel = ?channel, buflen = buf.len(), "port read");
        let (tx, rx) = oneshot::channel();

        // SAFETY: `submit` blocks this thread until the service responds, so
        // the buffer outlives the operation and is never aliased meanwhile.
        let buffer = unsafe { SendableBuffer::new(buf) };

        self.submit(
            IoRequest::Read {
                channel,
                buffer,
                response: tx,
            },
            rx,
        )
    }

    /// Write `data`; returns the count accepted.
    pub fn write(&self, channel: ChannelId, data: &[u8]) -> Result<usize> {
        trace!(channel = ?channel, bytes = data.len(), "port write");
        let (tx, rx) = oneshot::channel();
        self.submit(
            IoRequest::Write {
                channel,
                data: data.to_vec(),
                response: tx,
            },
            rx,
        )
    }

    /// Close the channel. For sinks this drives finalize and surfaces its
    /// failure.
    pub fn close(&self, channel: ChannelId) -> Result<()> {
        trace!(channel = ?channel, "port close");
        let (tx, rx) = oneshot::channel();
        self.submit(IoRequest::Close { channel, response: tx }, rx)
    }
}

fn service_stopped() -> Error {
    Error::Unavailable("storage service stopped".into())
}
