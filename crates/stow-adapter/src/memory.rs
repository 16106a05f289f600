use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{validate_name, AdapterError, AdapterResult};
use crate::traits::{ByteReader, ByteWriter, StorageAdapter};

type FileMap = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// Volatile, map-based storage adapter.
///
/// Intended for tests and embedding. Files live in a sorted map behind a
/// `RwLock`, so listings come back in name order. Write streams append
/// directly into the shared entry, which makes an in-flight file visible
/// (and deletable) exactly like one on disk.
pub struct MemoryAdapter {
    files: FileMap,
}

impl MemoryAdapter {
    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Create an adapter seeded with the given files.
    pub fn with_files<N, D>(files: impl IntoIterator<Item = (N, D)>) -> Self
    where
        N: Into<String>,
        D: Into<Vec<u8>>,
    {
        let map = files
            .into_iter()
            .map(|(name, data)| (name.into(), data.into()))
            .collect();
        Self {
            files: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.files.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if `name` is stored.
    pub fn contains(&self, name: &str) -> bool {
        self.files.read().expect("lock poisoned").contains_key(name)
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn init(&self) -> AdapterResult<()> {
        Ok(())
    }

    async fn list_files(&self) -> AdapterResult<Vec<String>> {
        let map = self.files.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    async fn create_read_stream(&self, name: &str) -> AdapterResult<ByteReader> {
        let data = self.read(name).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn create_write_stream(&self, name: &str) -> AdapterResult<ByteWriter> {
        validate_name(name)?;
        self.files
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            name: name.to_string(),
            closed: false,
        }))
    }

    async fn rename(&self, from: &str, to: &str) -> AdapterResult<()> {
        validate_name(from)?;
        validate_name(to)?;
        let mut map = self.files.write().expect("lock poisoned");
        let data = map
            .remove(from)
            .ok_or_else(|| AdapterError::NotFound(from.to_string()))?;
        map.insert(to.to_string(), data);
        Ok(())
    }

    async fn delete(&self, name: &str) -> AdapterResult<()> {
        validate_name(name)?;
        let mut map = self.files.write().expect("lock poisoned");
        match map.remove(name) {
            Some(_) => Ok(()),
            None => Err(AdapterError::NotFound(name.to_string())),
        }
    }

    async fn read(&self, name: &str) -> AdapterResult<Vec<u8>> {
        validate_name(name)?;
        let map = self.files.read().expect("lock poisoned");
        map.get(name)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, data: &[u8]) -> AdapterResult<()> {
        validate_name(name)?;
        self.files
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("file_count", &self.len())
            .finish()
    }
}

/// Write stream appending into one entry of a [`MemoryAdapter`].
struct MemoryWriter {
    files: FileMap,
    name: String,
    closed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "write after shutdown")));
        }
        let mut map = self.files.write().expect("lock poisoned");
        match map.get_mut(&self.name) {
            Some(data) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} was removed while being written", self.name),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed = true;
        Poll::Ready(Ok(()))
    }
}
