use std::sync::Arc;

use stow_adapter::{ByteReader, ByteWriter};
use stow_types::{ItemId, Metadata, TransformOptions};

use crate::error::DbResult;
use crate::iomanager::IoManager;

/// A handle to a committed document.
///
/// Holds the id and a copy of the metadata as of the last access. Streams
/// obtained through [`reader`](Self::reader) and [`writer`](Self::writer) pass
/// through the middleware chain; when the chain replaces the metadata, the
/// replacement is already persisted and is also adopted by this handle.
#[derive(Clone)]
pub struct Item {
    id: ItemId,
    metadata: Metadata,
    io: Arc<IoManager>,
}

impl Item {
    pub fn new(id: ItemId, metadata: Metadata, io: Arc<IoManager>) -> Self {
        Self { id, metadata, io }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the metadata. Edits stay local until
    /// [`save_metadata`](Self::save_metadata) is called.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    /// Open the content for reading.
    pub async fn reader(&mut self, options: &TransformOptions) -> DbResult<ByteReader> {
        let result = self
            .io
            .create_read_stream(&self.id, self.metadata.clone(), options)
            .await?;
        if result.metadata_changed {
            self.metadata = result.metadata;
        }
        Ok(result.stream)
    }

    /// Open the content for overwriting in place.
    pub async fn writer(&mut self, options: &TransformOptions) -> DbResult<ByteWriter> {
        let result = self
            .io
            .create_write_stream(&self.id, self.metadata.clone(), options)
            .await?;
        if result.metadata_changed {
            self.metadata = result.metadata;
        }
        Ok(result.stream)
    }

    /// Persist the current metadata.
    pub async fn save_metadata(&self) -> DbResult<()> {
        self.io.write_metadata(&self.id, &self.metadata).await
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use stow_adapter::{MemoryAdapter, StorageAdapter};
    use stow_middleware::{Middleware, MiddlewareManager, MiddlewareResult, StreamTransform, Transformed};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Counts read accesses in the metadata.
    struct ReadCounter;

    #[async_trait]
    impl StreamTransform<ByteReader> for ReadCounter {
        async fn transform(
            &self,
            stream: ByteReader,
            metadata: &Metadata,
            _options: &TransformOptions,
        ) -> MiddlewareResult<Transformed<ByteReader>> {
            let reads = metadata.get("reads").and_then(|v| v.as_u64()).unwrap_or(0);
            let mut next = metadata.clone();
            next.insert("reads".into(), json!(reads + 1));
            Ok(Transformed::new(stream).with_metadata(next))
        }
    }

    impl Middleware for ReadCounter {
        fn name(&self) -> &str {
            "read-counter"
        }

        fn readable(&self) -> Option<&dyn StreamTransform<ByteReader>> {
            Some(self)
        }
    }

    fn item(adapter: &Arc<MemoryAdapter>, chain: MiddlewareManager) -> Item {
        let io = Arc::new(IoManager::new(adapter.clone(), Arc::new(chain)));
        Item::new(ItemId::from("doc"), Metadata::new(), io)
    }

    #[tokio::test]
    async fn reader_streams_content() {
        let adapter = Arc::new(MemoryAdapter::with_files([("doc", "hello")]));
        let mut item = item(&adapter, MiddlewareManager::new());
        let mut buf = String::new();
        item.reader(&TransformOptions::new())
            .await
            .unwrap()
            .read_to_string(&mut buf)
            .await
            .unwrap();
        assert_eq!(buf, "hello");
        assert!(item.metadata().is_empty());
    }

    #[tokio::test]
    async fn reader_adopts_changed_metadata() {
        let adapter = Arc::new(MemoryAdapter::with_files([("doc", "hello")]));
        let chain = MiddlewareManager::new();
        chain.register(Arc::new(ReadCounter));
        let mut item = item(&adapter, chain);

        item.reader(&TransformOptions::new()).await.unwrap();
        item.reader(&TransformOptions::new()).await.unwrap();
        assert_eq!(item.metadata().get("reads"), Some(&json!(2)));

        let stored: Metadata = serde_json::from_slice(&adapter.read("doc.json").await.unwrap()).unwrap();
        assert_eq!(stored.get("reads"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn writer_overwrites_content() {
        let adapter = Arc::new(MemoryAdapter::with_files([("doc", "old")]));
        let mut item = item(&adapter, MiddlewareManager::new());
        let mut writer = item.writer(&TransformOptions::new()).await.unwrap();
        writer.write_all(b"new").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(adapter.read("doc").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn local_edits_persist_on_save() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut item = item(&adapter, MiddlewareManager::new());
        item.metadata_mut().insert("title".into(), json!("draft"));
        assert!(!adapter.contains("doc.json"));

        item.save_metadata().await.unwrap();
        assert_eq!(adapter.read("doc.json").await.unwrap(), br#"{"title":"draft"}"#);
    }

    #[tokio::test]
    async fn set_metadata_replaces_wholesale() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut item = item(&adapter, MiddlewareManager::new());
        item.metadata_mut().insert("a".into(), json!(1));
        let mut replacement = Metadata::new();
        replacement.insert("b".into(), json!(2));
        item.set_metadata(replacement.clone());
        assert_eq!(item.metadata(), &replacement);
    }
}
