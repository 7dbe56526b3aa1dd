//! Stream adapters: bounded read/write over backend-native transfer units.
//!
//! Backends deliver whatever chunk sizes suit them; callers hand in a buffer
//! and expect "up to N bytes, exact count back". The adapters bridge the two
//! contracts and hold the state that makes the bridge lossless: a retained
//! remainder on the read side, a deferred finalize on the write side.

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::backend::{ByteSink, ByteSource};
use crate::error::{Error, Result};

/// Pull side of the bridge: bounded reads over a chunked source.
pub struct SourceAdapter {
    source: Box<dyn ByteSource>,
    /// Unconsumed tail of the last chunk, served before pulling again.
    pending: Bytes,
    done: bool,
}

impl SourceAdapter {
    #[must_use]
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            pending: Bytes::new(),
            done: false,
        }
    }

    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns the exact count transferred; `Ok(0)` means end of stream and
    /// repeats on every subsequent call.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.source.next_chunk().await? {
                Some(chunk) => self.pending = chunk,
                None => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        trace!(bytes = n, retained = self.pending.len(), "source read");
        Ok(n)
    }
}

/// Push side of the bridge: ordered writes plus a one-shot finalize.
pub struct SinkAdapter {
    sink: Box<dyn ByteSink>,
    /// Bytes accepted but not yet made durable.
    pending_bytes: u64,
    finalized: bool,
}

impl SinkAdapter {
    #[must_use]
    pub fn new(sink: Box<dyn ByteSink>) -> Self {
        Self {
            sink,
            pending_bytes: 0,
            finalized: false,
        }
    }

    /// Accept up to `data.len()` bytes; returns the count taken.
    ///
    /// A zero-length write returns `Ok(0)` without touching the sink.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.finalized {
            return Err(Error::Io("write after finalize".into()));
        }
        let n = self.sink.accept(data).await?;
        self.pending_bytes += n as u64;
        trace!(bytes = n, pending = self.pending_bytes, "sink write");
        Ok(n)
    }

    /// Drive the sink's finalize. Invoked once, at handle close; a repeat
    /// call is a no-op so close stays idempotent after success.
    pub async fn finish(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.sink.finalize().await?;
        self.finalized = true;
        self.pending_bytes = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Source that yields a fixed script of chunks.
    struct ScriptedSource {
        chunks: Vec<Bytes>,
    }

    #[async_trait]
    impl ByteSource for ScriptedSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            if self.chunks.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.chunks.remove(0)))
            }
        }
    }

    /// Sink that remembers everything and can refuse to finalize.
    struct RecordingSink {
        accepted: Vec<u8>,
        fail_finalize: bool,
    }

    #[async_trait]
    impl ByteSink for RecordingSink {
        async fn accept(&mut self, data: &[u8]) -> Result<usize> {
            self.accepted.extend_from_slice(data);
            Ok(data.len())
        }

        async fn finalize(&mut self) -> Result<()> {
            if self.fail_finalize {
                Err(Error::Finalize("quota exceeded".into()))
            } else {
                Ok(())
            }
        }
    }

    fn scripted(chunks: &[&[u8]]) -> SourceAdapter {
        SourceAdapter::new(Box::new(ScriptedSource {
            chunks: chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect(),
        }))
    }

    #[tokio::test]
    async fn retains_remainder_across_short_reads() {
        let mut adapter = scripted(&[b"abcdefgh"]);
        let mut buf = [0u8; 3];

        assert_eq!(adapter.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"def");
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn eof_is_idempotent() {
        let mut adapter = scripted(&[b"x"]);
        let mut buf = [0u8; 8];

        assert_eq!(adapter.read(&mut buf).await.unwrap(), 1);
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 0);
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_buffer_reads_zero_without_pulling() {
        let mut adapter = scripted(&[b"data"]);
        let mut buf = [0u8; 0];

        assert_eq!(adapter.read(&mut buf).await.unwrap(), 0);
        // The chunk is still there for a real read.
        let mut buf = [0u8; 8];
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn chunk_boundaries_do_not_reorder() {
        let mut adapter = scripted(&[b"ab", b"cd", b"ef"]);
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = adapter.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn zero_length_write_is_a_no_op() {
        let mut adapter = SinkAdapter::new(Box::new(RecordingSink {
            accepted: Vec::new(),
            fail_finalize: false,
        }));
        assert_eq!(adapter.write(b"").await.unwrap(), 0);
        assert_eq!(adapter.pending_bytes, 0);
    }

    #[tokio::test]
    async fn finish_surfaces_finalize_failure() {
        let mut adapter = SinkAdapter::new(Box::new(RecordingSink {
            accepted: Vec::new(),
            fail_finalize: true,
        }));
        adapter.write(b"doomed").await.unwrap();
        let err = adapter.finish().await.unwrap_err();
        assert!(matches!(err, Error::Finalize(_)));
    }

    #[tokio::test]
    async fn finish_is_idempotent_after_success() {
        let mut adapter = SinkAdapter::new(Box::new(RecordingSink {
            accepted: Vec::new(),
            fail_finalize: false,
        }));
        adapter.write(b"ok").await.unwrap();
        adapter.finish().await.unwrap();
        adapter.finish().await.unwrap();
    }
}
