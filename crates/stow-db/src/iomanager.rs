use std::sync::Arc;

use stow_adapter::{ByteReader, ByteWriter, StorageAdapter};
use stow_middleware::{MiddlewareManager, TransformResult};
use stow_types::{ItemId, Metadata, TransformOptions};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Translates item-level I/O into adapter calls.
///
/// Every stream handed out passes through the middleware chain first.
/// Metadata produced by the chain is persisted here, before the stream is
/// returned, so callers never observe a stream whose metadata was lost.
pub struct IoManager {
    adapter: Arc<dyn StorageAdapter>,
    middleware: Arc<MiddlewareManager>,
}

impl IoManager {
    pub fn new(adapter: Arc<dyn StorageAdapter>, middleware: Arc<MiddlewareManager>) -> Self {
        Self {
            adapter,
            middleware,
        }
    }

    /// Open the published content of `id` for reading.
    ///
    /// If the chain changed the metadata, the new metadata is written before
    /// this returns.
    pub async fn create_read_stream(
        &self,
        id: &ItemId,
        metadata: Metadata,
        options: &TransformOptions,
    ) -> DbResult<TransformResult<ByteReader>> {
        let stream = self.adapter.create_read_stream(&id.content_name()).await?;
        let result = self
            .middleware
            .transform_readable(stream, metadata, options)
            .await?;
        if result.metadata_changed {
            self.write_metadata(id, &result.metadata).await?;
        }
        Ok(result)
    }

    /// Open the published content of `id` for overwriting.
    ///
    /// If the chain changed the metadata, the new metadata is written before
    /// this returns.
    pub async fn create_write_stream(
        &self,
        id: &ItemId,
        metadata: Metadata,
        options: &TransformOptions,
    ) -> DbResult<TransformResult<ByteWriter>> {
        let stream = self.adapter.create_write_stream(&id.content_name()).await?;
        let result = self
            .middleware
            .transform_writable(stream, metadata, options)
            .await?;
        if result.metadata_changed {
            self.write_metadata(id, &result.metadata).await?;
        }
        Ok(result)
    }

    /// Open a write stream to the in-flight artifact of a new item.
    ///
    /// The chain starts from empty metadata, and the resulting metadata is
    /// always written: a fresh item gets a metadata file even if no
    /// middleware touched it.
    pub async fn create_temporary(&self, id: &ItemId, options: &TransformOptions) -> DbResult<ByteWriter> {
        let stream = self.adapter.create_write_stream(&id.temporary_name()).await?;
        let result = self
            .middleware
            .transform_writable(stream, Metadata::new(), options)
            .await?;
        self.write_metadata(id, &result.metadata).await?;
        debug!(id = %id, "temporary created");
        Ok(result.stream)
    }

    /// Make the in-flight artifact of `id` the published content. The
    /// metadata file was written by [`create_temporary`](Self::create_temporary)
    /// and is left as-is.
    pub async fn publish(&self, id: &ItemId) -> DbResult<()> {
        self.adapter
            .rename(&id.temporary_name(), &id.content_name())
            .await?;
        debug!(id = %id, "published");
        Ok(())
    }

    /// Delete the content and the metadata of `id`. Both deletions are
    /// attempted; either failing fails the call.
    pub async fn delete(&self, id: &ItemId) -> DbResult<()> {
        let content_name = id.content_name();
        let metadata_name = id.metadata_name();
        let (content, metadata) = tokio::join!(
            self.adapter.delete(&content_name),
            self.adapter.delete(&metadata_name),
        );
        content?;
        metadata?;
        debug!(id = %id, "deleted");
        Ok(())
    }

    /// Delete the in-flight artifact and the metadata of `id`.
    ///
    /// A missing metadata file is ignored, since cleanup may run before the
    /// metadata was ever written.
    pub async fn delete_temporary(&self, id: &ItemId) -> DbResult<()> {
        let temporary_name = id.temporary_name();
        let metadata_name = id.metadata_name();
        let (temporary, metadata) = tokio::join!(
            self.adapter.delete(&temporary_name),
            self.adapter.delete(&metadata_name),
        );
        temporary?;
        match metadata {
            Err(err) if err.is_not_found() => {
                debug!(id = %id, "no metadata to clean up");
            }
            other => other?,
        }
        debug!(id = %id, "temporary deleted");
        Ok(())
    }

    /// Read and parse the metadata file of `id`.
    pub async fn read_metadata(&self, id: &ItemId) -> DbResult<Metadata> {
        let bytes = self.adapter.read(&id.metadata_name()).await?;
        serde_json::from_slice(&bytes).map_err(|source| DbError::MalformedMetadata {
            id: id.to_string(),
            source,
        })
    }

    /// Serialize and write the metadata file of `id`.
    pub async fn write_metadata(&self, id: &ItemId, metadata: &Metadata) -> DbResult<()> {
        let json = serde_json::to_vec(metadata)?;
        self.adapter.write(&id.metadata_name(), &json).await?;
        Ok(())
    }
}

impl std::fmt::Debug for IoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoManager")
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}
