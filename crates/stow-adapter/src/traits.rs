use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::AdapterResult;

/// A readable byte stream handed out by an adapter (or replaced by middleware).
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// A writable byte stream handed out by an adapter (or replaced by middleware).
///
/// Data is only guaranteed to be in storage once `shutdown` has completed.
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte-oriented storage keyed by flat file names.
///
/// All implementations must satisfy these invariants:
/// - `init` is idempotent; an already existing location is not an error.
/// - `list_files` returns an empty list if the location does not exist yet.
/// - `create_write_stream` creates (or truncates) the file before returning.
/// - `delete`, `read` and `create_read_stream` report a missing name as
///   [`AdapterError::NotFound`](crate::AdapterError::NotFound).
/// - All other I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Prepare the storage location.
    async fn init(&self) -> AdapterResult<()>;

    /// Names of all files currently stored.
    async fn list_files(&self) -> AdapterResult<Vec<String>>;

    /// Open a stream over the contents of `name`.
    async fn create_read_stream(&self, name: &str) -> AdapterResult<ByteReader>;

    /// Open a stream that replaces the contents of `name`.
    async fn create_write_stream(&self, name: &str) -> AdapterResult<ByteWriter>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    async fn rename(&self, from: &str, to: &str) -> AdapterResult<()>;

    /// Delete `name`.
    async fn delete(&self, name: &str) -> AdapterResult<()>;

    /// Read the whole contents of `name`.
    async fn read(&self, name: &str) -> AdapterResult<Vec<u8>>;

    /// Replace the whole contents of `name`.
    async fn write(&self, name: &str, data: &[u8]) -> AdapterResult<()>;
}
