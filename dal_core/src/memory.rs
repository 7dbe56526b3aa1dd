//! In-memory storage backend.
//!
//! Objects live in a shared hash map. Useful for tests and single-process
//! use. Writers stage bytes privately and publish the whole object on
//! finalize, so readers never observe a partially written object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::backend::{Backend, ByteSink, ByteSource};
use crate::error::{Error, Result};

/// Chunk size delivered by in-memory sources.
const CHUNK_SIZE: usize = 4096;

type ObjectMap = Arc<Mutex<HashMap<String, Bytes>>>;

/// Process-local object store backend.
pub struct MemBackend {
    objects: ObjectMap,
}

impl MemBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seed an object directly, bypassing the write path. Test helper.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.lock().insert(path.into(), data.into());
    }

    /// Snapshot an object's bytes, if present.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().get(path).cloned()
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemBackend {
    async fn open_read(&self, path: &str) -> Result<Box<dyn ByteSource>> {
        let data = self
            .objects
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(Box::new(MemSource { data, pos: 0 }))
    }

    async fn open_write(&self, path: &str) -> Result<Box<dyn ByteSink>> {
        Ok(Box::new(MemSink {
            path: path.to_string(),
            staged: Vec::new(),
            objects: Arc::clone(&self.objects),
        }))
    }
}

/// Reads a snapshot of an object in fixed-size chunks.
struct MemSource {
    data: Bytes,
    pos: usize,
}

#[async_trait]
impl ByteSource for MemSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + CHUNK_SIZE).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }
}

/// Stages bytes privately; publishes the object on finalize.
struct MemSink {
    path: String,
    staged: Vec<u8>,
    objects: ObjectMap,
}

#[async_trait]
impl ByteSink for MemSink {
    async fn accept(&mut self, data: &[u8]) -> Result<usize> {
        self.staged.extend_from_slice(data);
        Ok(data.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        self.objects.lock().insert(self.path.clone(), staged.into());
        Ok(())
    }
}
