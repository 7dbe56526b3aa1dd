//! Reader and writer handles.
//!
//! A handle owns one service channel for its whole life: Created → Open →
//! Closed, never back. Operations after close fail with
//! [`Error::InvalidHandle`] instead of touching freed state.
//!
//! Handles are not thread-safe per instance: `read`/`write` take `&mut self`
//! and the borrow checker enforces external synchronization. Distinct
//! handles, including two on the same path, proceed independently.
//!
//! # Example
//!
//! ```no_run
//! use dal_core::DataLayer;
//!
//! let layer = DataLayer::new().unwrap();
//! let mut writer = layer.open_writer("mem://greeting").unwrap();
//! writer.write(b"hello").unwrap();
//! writer.close().unwrap();
//!
//! let mut reader = layer.open_reader("mem://greeting").unwrap();
//! let mut buf = [0u8; 16];
//! let n = reader.read(&mut buf).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! ```

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::port::DalPort;
use crate::service::ChannelId;

/// Streaming read handle over a resolved backend object.
pub struct DalReader {
    port: DalPort,
    channel: Option<ChannelId>,
}

impl DalReader {
    pub(crate) fn new(port: DalPort, channel: ChannelId) -> Self {
        Self {
            port,
            channel: Some(channel),
        }
    }

    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns the exact count transferred. `Ok(0)` means clean end of
    /// stream and repeats on every later call.
    ///
    /// # Errors
    /// `InvalidHandle` after `close()`; backend errors propagate unchanged.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let channel = self.channel.ok_or(Error::InvalidHandle)?;
        self.port.read(channel, buf)
    }

    /// Release the backend stream. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the service rejects the close.
    pub fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            self.port.close(channel)?;
        }
        Ok(())
    }
}

impl Drop for DalReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "reader close failed in drop");
        }
    }
}

impl std::io::Read for DalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        DalReader::read(self, buf).map_err(Into::into)
    }
}

impl fmt::Debug for DalReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DalReader")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Streaming write handle over a resolved backend object.
///
/// Accepted bytes are not durable until `close()` returns `Ok`; that call
/// drives the backend's finalize and reports its failure instead of
/// discarding it.
pub struct DalWriter {
    port: DalPort,
    channel: Option<ChannelId>,
}

impl DalWriter {
    pub(crate) fn new(port: DalPort, channel: ChannelId) -> Self {
        Self {
            port,
            channel: Some(channel),
        }
    }

    /// Write `data`, returning the count accepted (may be less than
    /// `data.len()` under backpressure). Zero-length writes return `Ok(0)`
    /// without side effects.
    ///
    /// # Errors
    /// `InvalidHandle` after `close()`; backend errors propagate unchanged.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let channel = self.channel.ok_or(Error::InvalidHandle)?;
        self.port.write(channel, data)
    }

    /// Finalize and release the stream.
    ///
    /// This is the durability point: a finalize failure here means the
    /// object was not stored, and it is returned, never swallowed.
    pub fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            self.port.close(channel)?;
        }
        Ok(())
    }
}

impl Drop for DalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "writer finalize failed in drop; object not stored");
        }
    }
}

impl std::io::Write for DalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        DalWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Durability happens at close; there is no intermediate flush.
        Ok(())
    }
}

impl fmt::Debug for DalWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DalWriter")
            .field("channel", &self.channel)
            .finish()
    }
}
