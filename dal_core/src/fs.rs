//! Filesystem storage backend.
//!
//! Objects are files under a fixed root directory. Sinks write into a
//! `.partial` sibling and rename it over the final path on finalize, so a
//! crash or error never leaves a half-written object observable.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

use crate::backend::{Backend, ByteSink, ByteSource};
use crate::error::{Error, Result};

/// Read chunk size for filesystem sources.
const CHUNK_SIZE: usize = 8192;

/// Distinguishes temp files of concurrent writers to the same path.
static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Storage backend rooted at a local directory.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a backend-local path onto the root, refusing escapes.
    fn object_path(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(Error::InvalidPath(format!("path escapes root: {path}"))),
            }
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn open_read(&self, path: &str) -> Result<Box<dyn ByteSource>> {
        let full = self.object_path(path)?;
        let file = fs::File::open(&full).await?;
        Ok(Box::new(FsSource { file }))
    }

    async fn open_write(&self, path: &str) -> Result<Box<dyn ByteSink>> {
        let final_path = self.object_path(path)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut partial_path = final_path.clone().into_os_string();
        partial_path.push(format!(".partial-{seq}"));
        let partial_path = PathBuf::from(partial_path);

        let file = fs::File::create(&partial_path).await?;
        Ok(Box::new(FsSink {
            file: Some(file),
            partial_path,
            final_path,
        }))
    }
}

struct FsSource {
    file: fs::File,
}

#[async_trait]
impl ByteSource for FsSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

struct FsSink {
    /// Taken on finalize; `None` afterwards.
    file: Option<fs::File>,
    partial_path: PathBuf,
    final_path: PathBuf,
}

#[async_trait]
impl ByteSink for FsSink {
    async fn accept(&mut self, data: &[u8]) -> Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::Io("write after finalize".into()))?;
        let n = file.write(data).await?;
        Ok(n)
    }

    async fn finalize(&mut self) -> Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::Finalize("sink already finalized".into()))?;

        let result = async {
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&self.partial_path, &self.final_path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(rm) = fs::remove_file(&self.partial_path).await {
                warn!(path = ?self.partial_path, error = %rm, "failed to remove partial file");
            }
            return Err(Error::Finalize(e.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        let err = backend.open_read("missing.bin").await.err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        let err = backend.open_read("../outside").await.err().unwrap();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[tokio::test]
    async fn object_appears_only_after_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        let mut sink = backend.open_write("a/b/out.txt").await.unwrap();
        sink.accept(b"payload").await.unwrap();
        assert!(!dir.path().join("a/b/out.txt").exists());

        sink.finalize().await.unwrap();
        let written = std::fs::read(dir.path().join("a/b/out.txt")).unwrap();
        assert_eq!(written, b"payload");
    }

    #[tokio::test]
    async fn round_trip_through_source() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        let mut sink = backend.open_write("data.bin").await.unwrap();
        sink.accept(&[1, 2, 3, 4, 5]).await.unwrap();
        sink.finalize().await.unwrap();

        let mut source = backend.open_read("data.bin").await.unwrap();
        let chunk = source.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.as_ref(), &[1, 2, 3, 4, 5]);
        assert!(source.next_chunk().await.unwrap().is_none());
    }
}
