//! Top-level facade: owns the runtime, the service, and hands out handles.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::fs::FsBackend;
use crate::handles::{DalReader, DalWriter};
use crate::memory::MemBackend;
use crate::port::DalPort;
use crate::resolver::BackendResolver;
use crate::service::StorageService;

/// Environment variable overriding the filesystem backend root.
pub const FS_ROOT_ENV: &str = "DAL_FS_ROOT";

const DEFAULT_FS_ROOT: &str = "/tmp/dal";

/// The data access layer.
///
/// Owns a private tokio runtime with the storage service spawned onto it and
/// issues blocking [`DalReader`]/[`DalWriter`] handles. Intended for use from
/// plain (non-async) threads; inside an async context, talk to the backends
/// directly instead.
pub struct DataLayer {
    // Declared before the runtime so it drops first: releasing the last
    // in-layer sender lets the service loop wind down.
    port: DalPort,
    _runtime: tokio::runtime::Runtime,
}

impl DataLayer {
    /// Build a layer with the default backend set: the filesystem backend
    /// (rooted at `$DAL_FS_ROOT`, falling back to `/tmp/dal`) as default and
    /// under `fs://`, and the in-memory backend under `mem://`.
    pub fn new() -> Result<Self> {
        let root = fs_root_from_env();
        debug!(root = %root.display(), "building default backend set");

        let fs = Arc::new(FsBackend::new(root));
        let mut resolver = BackendResolver::new(Arc::clone(&fs) as Arc<dyn Backend>);
        resolver.register("fs", fs);
        resolver.register("mem", Arc::new(MemBackend::new()));
        Self::with_resolver(resolver)
    }

    /// Build a layer around an injected backend registry.
    pub fn with_resolver(resolver: BackendResolver) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Unavailable(format!("runtime start failed: {e}")))?;

        let service = StorageService::new(resolver);
        let port = DalPort::new(service.request_sender());
        runtime.spawn(service.run());

        Ok(Self {
            port,
            _runtime: runtime,
        })
    }

    /// Open a streaming reader for `path`.
    ///
    /// # Errors
    /// `NotFound`, `PermissionDenied`, `Unavailable` or `InvalidPath`, as
    /// propagated from resolution and the backend.
    pub fn open_reader(&self, path: &str) -> Result<DalReader> {
        let channel = self.port.open_read(path)?;
        Ok(DalReader::new(self.port.clone(), channel))
    }

    /// Open a streaming writer for `path`.
    pub fn open_writer(&self, path: &str) -> Result<DalWriter> {
        let channel = self.port.open_write(path)?;
        Ok(DalWriter::new(self.port.clone(), channel))
    }

    /// A raw port for callers that manage channels themselves (the FFI
    /// boundary does, through its handle table).
    #[must_use]
    pub fn port(&self) -> DalPort {
        self.port.clone()
    }
}

fn fs_root_from_env() -> PathBuf {
    std::env::var_os(FS_ROOT_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_FS_ROOT), PathBuf::from)
}
