//! Streaming read/write core over pluggable storage backends.
//!
//! The core turns backend-native transfer semantics (async, chunked,
//! network-bound) into blocking, bounded read/write handles:
//!
//! - [`backend`] defines the capability traits storage drivers implement
//! - [`resolver`] picks a backend for a path, once, at open time
//! - [`adapter`] bridges chunked sources/sinks to the bounded contract
//! - [`service`] runs all backend I/O on one async event loop
//! - [`port`] is the blocking bridge into that loop
//! - [`handles`] are the caller-facing reader/writer objects
//! - [`registry`] is the identity table guarding the C boundary
//! - [`layer`] wires it all together

pub mod adapter;
pub mod backend;
pub mod error;
pub mod fs;
pub mod handles;
pub mod layer;
pub mod memory;
pub mod port;
pub mod registry;
pub mod resolver;
pub mod service;

pub use backend::{Backend, ByteSink, ByteSource};
pub use error::{Error, Result};
pub use handles::{DalReader, DalWriter};
pub use layer::DataLayer;
pub use port::DalPort;
pub use registry::{HandleEntry, HandleId, HandleKind, HandleTable};
pub use resolver::BackendResolver;
pub use service::{Channel, ChannelId, IoEvent, IoFuture, IoRequest, SendableBuffer, StorageService};
