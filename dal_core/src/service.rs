//! Storage service: the async side of the blocking bridge.
//!
//! All backend I/O runs inside one event loop. Blocking callers submit
//! `IoRequest`s over an unbounded channel and wait on a oneshot for the
//! outcome. Opens, reads and writes are pushed onto a `FuturesUnordered` so
//! a slow backend never stalls unrelated channels; only path resolution and
//! reader closes are handled inline.
//!
//! Each open handle maps to a channel table entry owning its stream adapter.
//! The adapter is taken out of the slot while an operation is in flight and
//! put back by the completion event, which turns an overlapping second
//! operation on the same channel into a clean error instead of a data race.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::adapter::{SinkAdapter, SourceAdapter};
use crate::backend::{ByteSink, ByteSource};
use crate::error::{Error, Result};
use crate::resolver::BackendResolver;

/// Identifies one open stream inside the service's channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub usize);

/// A channel table entry. The adapter is `None` while an async operation
/// on it is in flight.
pub enum Channel {
    Source(Option<SourceAdapter>),
    Sink(Option<SinkAdapter>),
}

/// A raw mutable slice pointer that may cross thread boundaries.
///
/// SAFETY: sound only because the submitting caller blocks on the response
/// oneshot until the service is done with the buffer, which guarantees:
/// 1. the buffer outlives the operation (the stack frame cannot unwind),
/// 2. no concurrent access (the owner is parked),
/// 3. happens-before ordering (enforced by the channel pair).
pub struct SendableBuffer {
    ptr: *mut [u8],
    #[cfg(debug_assertions)]
    consumed: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl SendableBuffer {
    /// Wrap a caller buffer for transport to the service.
    ///
    /// # Safety
    /// The caller must block on the operation's response before the buffer
    /// goes out of scope, must not touch the buffer meanwhile, and must let
    /// the service consume the wrapper exactly once via `into_raw`.
    pub unsafe fn new(buffer: &mut [u8]) -> Self {
        Self {
            ptr: std::ptr::from_mut::<[u8]>(buffer),
            #[cfg(debug_assertions)]
            consumed: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Consume the wrapper, yielding the raw pointer. Panics in debug builds
    /// if consumed twice.
    pub fn into_raw(self) -> *mut [u8] {
        #[cfg(debug_assertions)]
        {
            let already = self
                .consumed
                .swap(true, std::sync::atomic::Ordering::SeqCst);
            assert!(!already, "SendableBuffer consumed twice");
        }
        self.ptr
    }
}

// SAFETY: see the SendableBuffer contract above.
unsafe impl Send for SendableBuffer {}

/// Requests submitted by blocking ports.
pub enum IoRequest {
    /// Resolve the path and open a read stream.
    OpenRead {
        path: String,
        response: oneshot::Sender<Result<ChannelId>>,
    },
    /// Resolve the path and open a write stream.
    OpenWrite {
        path: String,
        response: oneshot::Sender<Result<ChannelId>>,
    },
    /// Bounded read into the caller's buffer.
    /// SAFETY: the buffer stays valid because the caller blocks on `response`.
    Read {
        channel: ChannelId,
        buffer: SendableBuffer,
        response: oneshot::Sender<Result<usize>>,
    },
    /// Ordered write of an owned copy of the caller's data.
    Write {
        channel: ChannelId,
        data: Vec<u8>,
        response: oneshot::Sender<Result<usize>>,
    },
    /// Close the channel; finalizes sinks and reports their failure.
    Close {
        channel: ChannelId,
        response: oneshot::Sender<Result<()>>,
    },
}

/// Completion of an in-flight operation.
pub enum IoEvent {
    OpenReadDone {
        result: Result<Box<dyn ByteSource>>,
        response: oneshot::Sender<Result<ChannelId>>,
    },
    OpenWriteDone {
        result: Result<Box<dyn ByteSink>>,
        response: oneshot::Sender<Result<ChannelId>>,
    },
    ReadDone {
        channel: ChannelId,
        adapter: SourceAdapter,
        result: Result<usize>,
        response: oneshot::Sender<Result<usize>>,
    },
    WriteDone {
        channel: ChannelId,
        adapter: SinkAdapter,
        result: Result<usize>,
        response: oneshot::Sender<Result<usize>>,
    },
    CloseDone {
        result: Result<()>,
        response: oneshot::Sender<Result<()>>,
    },
}

pub type IoFuture = Pin<Box<dyn Future<Output = IoEvent> + Send>>;

/// Owns the channel table and drives all backend I/O.
pub struct StorageService {
    resolver: BackendResolver,
    channels: HashMap<ChannelId, Channel>,
    next_channel_id: usize,
    /// Kept until `run()` starts so ports can be created; dropped there so
    /// the loop exits once every port is gone.
    service_tx: Option<mpsc::UnboundedSender<IoRequest>>,
    request_rx: mpsc::UnboundedReceiver<IoRequest>,
}

impl StorageService {
    #[must_use]
    pub fn new(resolver: BackendResolver) -> Self {
        let (service_tx, request_rx) = mpsc::unbounded_channel();
        Self {
            resolver,
            channels: HashMap::new(),
            next_channel_id: 0,
            service_tx: Some(service_tx),
            request_rx,
        }
    }

    /// Get the request sender for creating blocking ports.
    #[allow(clippy::expect_used)]
    pub fn request_sender(&self) -> mpsc::UnboundedSender<IoRequest> {
        self.service_tx.as_ref().expect("service_tx taken").clone()
    }

    fn alloc_channel_id(&mut self) -> ChannelId {
        let id = ChannelId(self.next_channel_id);
        self.next_channel_id += 1;
        id
    }

    /// Resolve the path inline, then run the backend open as an in-flight
    /// future so a slow open never stalls other channels.
    fn handle_open_read(
        &mut self,
        path: String,
        response: oneshot::Sender<Result<ChannelId>>,
    ) -> Option<IoFuture> {
        debug!(path = %path, "processing OpenRead");
        match self.resolver.resolve(&path) {
            Ok((backend, rest)) => {
                let rest = rest.to_string();
                Some(Box::pin(async move {
                    let result = backend.open_read(&rest).await;
                    IoEvent::OpenReadDone { result, response }
                }))
            }
            Err(e) => {
                let _ = response.send(Err(e));
                None
            }
        }
    }

    fn handle_open_write(
        &mut self,
        path: String,
        response: oneshot::Sender<Result<ChannelId>>,
    ) -> Option<IoFuture> {
        debug!(path = %path, "processing OpenWrite");
        match self.resolver.resolve(&path) {
            Ok((backend, rest)) => {
                let rest = rest.to_string();
                Some(Box::pin(async move {
                    let result = backend.open_write(&rest).await;
                    IoEvent::OpenWriteDone { result, response }
                }))
            }
            Err(e) => {
                let _ = response.send(Err(e));
                None
            }
        }
    }

    fn handle_open_read_done(
        &mut self,
        result: Result<Box<dyn ByteSource>>,
        response: oneshot::Sender<Result<ChannelId>>,
    ) {
        let result = result.map(|source| {
            let channel = self.alloc_channel_id();
            self.channels
                .insert(channel, Channel::Source(Some(SourceAdapter::new(source))));
            trace!(channel = ?channel, "read stream opened");
            channel
        });
        let _ = response.send(result);
    }

    fn handle_open_write_done(
        &mut self,
        result: Result<Box<dyn ByteSink>>,
        response: oneshot::Sender<Result<ChannelId>>,
    ) {
        let result = result.map(|sink| {
            let channel = self.alloc_channel_id();
            self.channels
                .insert(channel, Channel::Sink(Some(SinkAdapter::new(sink))));
            trace!(channel = ?channel, "write stream opened");
            channel
        });
        let _ = response.send(result);
    }

    fn handle_read(
        &mut self,
        channel: ChannelId,
        buffer: SendableBuffer,
        response: oneshot::Sender<Result<usize>>,
    ) -> Option<IoFuture> {
        trace!(channel = ?channel, "processing Read");

        match self.channels.get_mut(&channel) {
            Some(Channel::Source(slot)) => {
                if let Some(mut adapter) = slot.take() {
                    Some(Box::pin(async move {
                        // SAFETY: the caller blocks until `response` fires.
                        let buf = unsafe { &mut *buffer.into_raw() };
                        let result = adapter.read(buf).await;
                        IoEvent::ReadDone {
                            channel,
                            adapter,
                            result,
                            response,
                        }
                    }))
                } else {
                    warn!(channel = ?channel, "read while another operation is in flight");
                    let _ = response.send(Err(Error::Io("operation already in flight".into())));
                    None
                }
            }
            Some(Channel::Sink(_)) => {
                warn!(channel = ?channel, "read on a write channel");
                let _ = response.send(Err(Error::InvalidHandle));
                None
            }
            None => {
                warn!(channel = ?channel, "read on unknown channel");
                let _ = response.send(Err(Error::InvalidHandle));
                None
            }
        }
    }

    fn handle_write(
        &mut self,
        channel: ChannelId,
        data: Vec<u8>,
        response: oneshot::Sender<Result<usize>>,
    ) -> Option<IoFuture> {
        trace!(channel = ?channel, bytes = data.len(), "processing Write");

        match self.channels.get_mut(&channel) {
            Some(Channel::Sink(slot)) => {
                if let Some(mut adapter) = slot.take() {
                    Some(Box::pin(async move {
                        let result = adapter.write(&data).await;
                        IoEvent::WriteDone {
                            channel,
                            adapter,
                            result,
                            response,
                        }
                    }))
                } else {
                    warn!(channel = ?channel, "write while another operation is in flight");
                    let _ = response.send(Err(Error::Io("operation already in flight".into())));
                    None
                }
            }
            Some(Channel::Source(_)) => {
                warn!(channel = ?channel, "write on a read channel");
                let _ = response.send(Err(Error::InvalidHandle));
                None
            }
            None => {
                warn!(channel = ?channel, "write on unknown channel");
                let _ = response.send(Err(Error::InvalidHandle));
                None
            }
        }
    }

    /// Close a channel. Sources are released on the spot; sinks run their
    /// finalize asynchronously so a failure reaches the caller.
    fn handle_close(
        &mut self,
        channel: ChannelId,
        response: oneshot::Sender<Result<()>>,
    ) -> Option<IoFuture> {
        trace!(channel = ?channel, "processing Close");

        match self.channels.remove(&channel) {
            Some(Channel::Source(_)) => {
                trace!(channel = ?channel, "read channel closed");
                let _ = response.send(Ok(()));
                None
            }
            Some(Channel::Sink(Some(mut adapter))) => Some(Box::pin(async move {
                let result = adapter.finish().await;
                if let Err(ref e) = result {
                    warn!(channel = ?channel, error = %e, "finalize failed at close");
                }
                IoEvent::CloseDone { result, response }
            })),
            Some(Channel::Sink(None)) => {
                // A write is still in flight; its adapter will be dropped
                // unfinalized when it completes.
                warn!(channel = ?channel, "close while a write is in flight");
                let _ = response.send(Err(Error::Io("operation already in flight".into())));
                None
            }
            None => {
                warn!(channel = ?channel, "close on unknown channel");
                let _ = response.send(Err(Error::InvalidHandle));
                None
            }
        }
    }

    fn handle_read_done(
        &mut self,
        channel: ChannelId,
        adapter: SourceAdapter,
        result: Result<usize>,
        response: oneshot::Sender<Result<usize>>,
    ) {
        trace!(channel = ?channel, "read completed");
        // Put the adapter back unless the channel was closed meanwhile.
        if let Some(Channel::Source(slot)) = self.channels.get_mut(&channel) {
            *slot = Some(adapter);
        } else {
            debug!(channel = ?channel, "channel closed during read, dropping adapter");
        }
        let _ = response.send(result);
    }

    fn handle_write_done(
        &mut self,
        channel: ChannelId,
        adapter: SinkAdapter,
        result: Result<usize>,
        response: oneshot::Sender<Result<usize>>,
    ) {
        trace!(channel = ?channel, "write completed");
        if let Some(Channel::Sink(slot)) = self.channels.get_mut(&channel) {
            *slot = Some(adapter);
        } else {
            debug!(channel = ?channel, "channel closed during write, dropping adapter");
        }
        let _ = response.send(result);
    }

    /// Main event loop. Exits when every port is dropped and no operation
    /// is pending.
    pub async fn run(mut self) {
        drop(self.service_tx.take());

        let mut pending_ops: FuturesUnordered<IoFuture> = FuturesUnordered::new();
        let mut request_rx_open = true;

        loop {
            if !request_rx_open && pending_ops.is_empty() {
                info!("all ports dropped, storage service exiting");
                break;
            }

            tokio::select! {
                request = self.request_rx.recv(), if request_rx_open => {
                    if let Some(request) = request {
                        match request {
                            IoRequest::OpenRead { path, response } => {
                                if let Some(fut) = self.handle_open_read(path, response) {
                                    pending_ops.push(fut);
                                }
                            }
                            IoRequest::OpenWrite { path, response } => {
                                if let Some(fut) = self.handle_open_write(path, response) {
                                    pending_ops.push(fut);
                                }
                            }
                            IoRequest::Read { channel, buffer, response } => {
                                if let Some(fut) = self.handle_read(channel, buffer, response) {
                                    pending_ops.push(fut);
                                }
                            }
                            IoRequest::Write { channel, data, response } => {
                                if let Some(fut) = self.handle_write(channel, data, response) {
                                    pending_ops.push(fut);
                                }
                            }
                            IoRequest::Close { channel, response } => {
                                if let Some(fut) = self.handle_close(channel, response) {
                                    pending_ops.push(fut);
                                }
                            }
                        }
                    } else {
                        debug!("request channel closed");
                        request_rx_open = false;
                    }
                }

                Some(event) = pending_ops.next(), if !pending_ops.is_empty() => {
                    match event {
                        IoEvent::OpenReadDone { result, response } => {
                            self.handle_open_read_done(result, response);
                        }
                        IoEvent::OpenWriteDone { result, response } => {
                            self.handle_open_write_done(result, response);
                        }
                        IoEvent::ReadDone { channel, adapter, result, response } => {
                            self.handle_read_done(channel, adapter, result, response);
                        }
                        IoEvent::WriteDone { channel, adapter, result, response } => {
                            self.handle_write_done(channel, adapter, result, response);
                        }
                        IoEvent::CloseDone { result, response } => {
                            let _ = response.send(result);
                        }
                    }
                }
            }
        }
    }
}
