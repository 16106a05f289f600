use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use stow_adapter::{DirectoryAdapter, MemoryAdapter, StorageAdapter};
use stow_middleware::{Middleware, MiddlewareManager};
use stow_types::{is_committed_name, ItemId, TransformOptions};
use tracing::{info, warn};

use crate::change::Change;
use crate::config::{StorageSource, StowConfig};
use crate::error::{DbError, DbResult};
use crate::idset::IdSet;
use crate::iomanager::IoManager;
use crate::item::Item;

struct StowInner {
    adapter: Arc<dyn StorageAdapter>,
    middleware: Arc<MiddlewareManager>,
    io: Arc<IoManager>,
    ids: IdSet,
}

/// An embedded document store.
///
/// Items are written through a [`Change`] and become visible under their id
/// only once committed. Clones share the same storage, middleware chain and
/// id index.
#[derive(Clone)]
pub struct Stow {
    inner: Arc<StowInner>,
}

impl Stow {
    /// A store backed by volatile memory.
    pub fn in_memory() -> Self {
        Self::with_adapter(Arc::new(MemoryAdapter::new()))
    }

    /// A store backed by a directory, created on the first `create`.
    pub fn at_directory(path: impl Into<PathBuf>) -> Self {
        Self::with_adapter(Arc::new(DirectoryAdapter::new(path)))
    }

    pub fn open(config: &StowConfig) -> Self {
        match &config.source {
            StorageSource::Memory => Self::in_memory(),
            StorageSource::Directory { path } => Self::at_directory(path.clone()),
        }
    }

    /// A store over any adapter. Existing items are discovered from the
    /// adapter's listing on first use.
    pub fn with_adapter(adapter: Arc<dyn StorageAdapter>) -> Self {
        let middleware = Arc::new(MiddlewareManager::new());
        let io = Arc::new(IoManager::new(adapter.clone(), middleware.clone()));

        let lister = adapter.clone();
        let ids = IdSet::new(move || committed_ids(lister.clone()));

        Self {
            inner: Arc::new(StowInner {
                adapter,
                middleware,
                io,
                ids,
            }),
        }
    }

    /// Append a middleware to the chain. It applies to every stream opened
    /// after this call.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) -> &Self {
        self.inner.middleware.register(Arc::new(middleware));
        self
    }

    // ---- Item lifecycle ----

    /// Start writing a new item under a freshly generated id.
    ///
    /// The item does not exist for [`get`](Self::get) or [`each`](Self::each)
    /// until the returned change is committed.
    pub async fn create(&self, options: &TransformOptions) -> DbResult<Change> {
        self.inner.adapter.init().await?;

        let id = ItemId::generate();
        let writer = match self.inner.io.create_temporary(&id, options).await {
            Ok(writer) => writer,
            Err(err) => {
                if let Err(cleanup) = self.inner.io.delete_temporary(&id).await {
                    warn!(id = %id, error = %cleanup, "cleanup after failed create failed");
                }
                return Err(err);
            }
        };

        let committer = {
            let store = self.clone();
            let id = id.clone();
            move || async move {
                store.inner.io.publish(&id).await?;
                store.inner.ids.add(id.clone()).await?;
                store.get(id.as_str()).await
            }
        };
        let destroyer = {
            let io = self.inner.io.clone();
            let id = id.clone();
            move || async move { io.delete_temporary(&id).await }
        };

        info!(id = %id, "change created");
        Ok(Change::new(id, writer, committer, destroyer))
    }

    /// Look up a committed item.
    pub async fn get(&self, id: &str) -> DbResult<Item> {
        if !self.inner.ids.includes(id).await? {
            return Err(DbError::NotFound(id.to_owned()));
        }
        let id = ItemId::from(id);
        let metadata = self.inner.io.read_metadata(&id).await?;
        Ok(Item::new(id, metadata, self.inner.io.clone()))
    }

    /// Delete a committed item's content and metadata.
    ///
    /// Storage is deleted before the id leaves the index. If the deletion
    /// fails partway, the id stays listed and `get` reports the missing
    /// artifacts.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        if !self.inner.ids.includes(id).await? {
            return Err(DbError::NotFound(id.to_owned()));
        }
        let id = ItemId::from(id);
        self.inner.io.delete(&id).await?;
        self.inner.ids.remove(id.as_str()).await?;
        info!(id = %id, "item removed");
        Ok(())
    }

    /// Visit every committed item in insertion order.
    ///
    /// Items are handed to `callback` one at a time; the next one is not
    /// looked up until the callback's future completes, so the callback may
    /// remove items. A removed item that has not been visited yet is skipped.
    /// An error from the callback stops the iteration and is returned.
    pub async fn each<F, Fut>(&self, mut callback: F) -> DbResult<()>
    where
        F: FnMut(Item) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        let mut cursor = self.inner.ids.cursor();
        while let Some(id) = cursor.next().await? {
            let item = self.get(id.as_str()).await?;
            callback(item).await?;
        }
        Ok(())
    }
}

/// Ids of published items in the adapter's listing.
async fn committed_ids(adapter: Arc<dyn StorageAdapter>) -> DbResult<Vec<ItemId>> {
    let names = adapter.list_files().await?;
    Ok(names
        .into_iter()
        .filter(|name| is_committed_name(name))
        .map(ItemId::from)
        .collect())
}

impl std::fmt::Debug for Stow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stow")
            .field("middleware", &self.inner.middleware)
            .field("ids", &self.inner.ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;
    use stow_adapter::{ByteReader, ByteWriter};
    use stow_middleware::{MiddlewareError, MiddlewareResult, StreamTransform, Transformed};
    use stow_types::Metadata;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn store() -> (Stow, Arc<MemoryAdapter>) {
        init_tracing();
        let adapter = Arc::new(MemoryAdapter::new());
        (Stow::with_adapter(adapter.clone()), adapter)
    }

    async fn put(store: &Stow, content: &str) -> Item {
        let mut change = store.create(&TransformOptions::new()).await.unwrap();
        change.write_all(content.as_bytes()).await.unwrap();
        change.commit().await.unwrap()
    }

    async fn read_all(item: &mut Item) -> String {
        let mut buf = String::new();
        let mut reader = item.reader(&TransformOptions::new()).await.unwrap();
        reader.read_to_string(&mut buf).await.unwrap();
        buf
    }

    // ---- Lifecycle ----

    #[tokio::test]
    async fn uncommitted_item_is_not_found() {
        let (store, adapter) = store();
        let change = store.create(&TransformOptions::new()).await.unwrap();

        let err = store.get(change.id().as_str()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, DbError::NotFound(_)));
        assert!(adapter.contains(&change.id().temporary_name()));
    }

    #[tokio::test]
    async fn create_commit_get() {
        let (store, adapter) = store();
        let mut change = store.create(&TransformOptions::new()).await.unwrap();
        change.write_all(b"hello").await.unwrap();
        let committed = change.commit().await.unwrap();
        assert_eq!(committed.id(), change.id());

        let mut item = store.get(change.id().as_str()).await.unwrap();
        assert_eq!(item.id(), change.id());
        assert!(item.metadata().is_empty());
        assert_eq!(read_all(&mut item).await, "hello");

        let id = change.id().clone();
        assert_eq!(
            adapter.list_files().await.unwrap(),
            vec![id.content_name(), id.metadata_name()]
        );
    }

    #[tokio::test]
    async fn ids_are_fresh_per_change() {
        let (store, _) = store();
        let a = store.create(&TransformOptions::new()).await.unwrap();
        let b = store.create(&TransformOptions::new()).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_str().len(), 32);
    }

    #[tokio::test]
    async fn second_commit_leaves_first_result_intact() {
        let (store, _) = store();
        let mut change = store.create(&TransformOptions::new()).await.unwrap();
        let first = change.commit().await.unwrap();

        assert!(change.commit().await.unwrap_err().is_invalid_state());
        assert!(store.get(first.id().as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn destroyed_change_leaves_no_artifacts() {
        let (store, adapter) = store();
        let mut change = store.create(&TransformOptions::new()).await.unwrap();
        change.write_all(b"discard me").await.unwrap();
        change.destroy().await.unwrap();

        assert!(adapter.is_empty());
        assert!(store.get(change.id().as_str()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn remove_deletes_content_and_metadata() {
        let (store, adapter) = store();
        let item = put(&store, "bye").await;
        let id = item.id().clone();

        store.remove(id.as_str()).await.unwrap();
        assert!(store.get(id.as_str()).await.unwrap_err().is_not_found());
        let files = adapter.list_files().await.unwrap();
        assert!(!files.contains(&id.content_name()));
        assert!(!files.contains(&id.metadata_name()));
    }

    #[tokio::test]
    async fn remove_unknown_is_not_found() {
        let (store, _) = store();
        let err = store.remove("0123456789abcdef").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(ref id) if id == "0123456789abcdef"));
    }

    // ---- Iteration ----

    #[tokio::test]
    async fn each_visits_every_item_in_order() {
        let (store, _) = store();
        let mut ids = Vec::new();
        for content in ["a", "b", "c"] {
            ids.push(put(&store, content).await.id().clone());
        }

        let mut seen = Vec::new();
        store
            .each(|item| {
                seen.push(item.id().clone());
                async { Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn each_waits_for_callback() {
        let (store, _) = store();
        for content in ["a", "b"] {
            put(&store, content).await;
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        store
            .each(|item| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("start {}", item.id()));
                    tokio::task::yield_now().await;
                    log.lock().unwrap().push(format!("end {}", item.id()));
                    Ok(())
                }
            })
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        for pair in log.chunks(2) {
            assert!(pair[0].starts_with("start"));
            assert!(pair[1].starts_with("end"));
        }
    }

    #[tokio::test]
    async fn each_skips_items_removed_before_visit() {
        let (store, _) = store();
        let first = put(&store, "a").await.id().clone();
        let second = put(&store, "b").await.id().clone();
        let third = put(&store, "c").await.id().clone();

        let seen = Arc::new(Mutex::new(Vec::new()));
        store
            .each(|item| {
                let (store, seen, second) = (store.clone(), seen.clone(), second.clone());
                async move {
                    seen.lock().unwrap().push(item.id().clone());
                    if seen.lock().unwrap().len() == 1 {
                        return store.remove(second.as_str()).await;
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![first, third]);
    }

    #[tokio::test]
    async fn each_allows_removing_current_item() {
        let (store, _) = store();
        for content in ["a", "b", "c"] {
            put(&store, content).await;
        }

        let mut visits = 0;
        let remover = store.clone();
        store
            .each(|item| {
                visits += 1;
                let store = remover.clone();
                async move { store.remove(item.id().as_str()).await }
            })
            .await
            .unwrap();

        assert_eq!(visits, 3);
        let mut left = 0;
        store
            .each(|_| {
                left += 1;
                async { Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn each_stops_on_callback_error() {
        let (store, _) = store();
        for content in ["a", "b", "c"] {
            put(&store, content).await;
        }

        let mut visits = 0;
        let err = store
            .each(|_| {
                visits += 1;
                async { Err(DbError::InvalidState("stop")) }
            })
            .await
            .unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(visits, 1);
    }

    // ---- Existing storage ----

    #[tokio::test]
    async fn discovers_existing_items_and_ignores_artifacts() {
        init_tracing();
        let adapter = Arc::new(MemoryAdapter::with_files([
            ("aaaa", "a"),
            ("aaaa.json", r#"{"title":"A"}"#),
            ("bbbb", "b"),
            ("bbbb.json", "{}"),
            ("cccc.tmp", "half-written"),
            ("cccc.json", "{}"),
        ]));
        let store = Stow::with_adapter(adapter);

        let item = store.get("aaaa").await.unwrap();
        assert_eq!(item.metadata().get("title"), Some(&json!("A")));
        assert!(store.get("bbbb").await.is_ok());
        assert!(store.get("cccc").await.unwrap_err().is_not_found());
        assert!(store.get("cccc.tmp").await.unwrap_err().is_not_found());

        let mut seen = Vec::new();
        store
            .each(|item| {
                seen.push(item.id().to_string());
                async { Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["aaaa", "bbbb"]);
    }

    #[tokio::test]
    async fn malformed_metadata_surfaces_on_get() {
        init_tracing();
        let adapter = Arc::new(MemoryAdapter::with_files([("aaaa", ""), ("aaaa.json", "not json")]));
        let store = Stow::with_adapter(adapter);
        let err = store.get("aaaa").await.unwrap_err();
        assert!(matches!(err, DbError::MalformedMetadata { .. }));
    }

    #[tokio::test]
    async fn directory_store_survives_reopen() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items");

        let store = Stow::open(&StowConfig::directory(&path));
        let mut item = put(&store, "persisted").await;
        item.metadata_mut().insert("title".into(), json!("doc"));
        item.save_metadata().await.unwrap();
        let id = item.id().clone();

        // An abandoned change leaves only a temporary artifact behind.
        let mut pending = store.create(&TransformOptions::new()).await.unwrap();
        pending.write_all(b"never committed").await.unwrap();
        drop(pending);

        let reopened = Stow::at_directory(&path);
        let mut found = reopened.get(id.as_str()).await.unwrap();
        assert_eq!(found.metadata().get("title"), Some(&json!("doc")));
        assert_eq!(read_all(&mut found).await, "persisted");

        let mut count = 0;
        reopened
            .each(|_| {
                count += 1;
                async { Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn directory_remove() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let store = Stow::at_directory(dir.path());
        let id = put(&store, "x").await.id().clone();

        store.remove(id.as_str()).await.unwrap();
        let adapter = DirectoryAdapter::new(dir.path());
        assert!(adapter.list_files().await.unwrap().is_empty());
    }

    // ---- Middleware ----

    /// Records its name into the metadata on write and upper-cases on read.
    struct Tag(&'static str);

    #[async_trait]
    impl StreamTransform<ByteWriter> for Tag {
        async fn transform(
            &self,
            stream: ByteWriter,
            metadata: &Metadata,
            options: &TransformOptions,
        ) -> MiddlewareResult<Transformed<ByteWriter>> {
            let mut tags = metadata
                .get("tags")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            tags.push(json!(self.0));
            let mut next = metadata.clone();
            next.insert("tags".into(), json!(tags));
            if let Some(owner) = options.get("owner") {
                next.insert("owner".into(), owner.clone());
            }
            Ok(Transformed::new(stream).with_metadata(next))
        }
    }

    impl Middleware for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn writable(&self) -> Option<&dyn StreamTransform<ByteWriter>> {
            Some(self)
        }
    }

    struct Upper;

    #[async_trait]
    impl StreamTransform<ByteReader> for Upper {
        async fn transform(
            &self,
            mut stream: ByteReader,
            _metadata: &Metadata,
            _options: &TransformOptions,
        ) -> MiddlewareResult<Transformed<ByteReader>> {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            buf.make_ascii_uppercase();
            Ok(Transformed::new(Box::new(std::io::Cursor::new(buf)) as ByteReader))
        }
    }

    impl Middleware for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn readable(&self) -> Option<&dyn StreamTransform<ByteReader>> {
            Some(self)
        }
    }

    /// Hands back a write stream that cannot be finalized.
    struct BrokenSink;

    struct Unflushable(ByteWriter);

    impl tokio::io::AsyncWrite for Unflushable {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("device gone")))
        }
    }

    #[async_trait]
    impl StreamTransform<ByteWriter> for BrokenSink {
        async fn transform(
            &self,
            stream: ByteWriter,
            _metadata: &Metadata,
            _options: &TransformOptions,
        ) -> MiddlewareResult<Transformed<ByteWriter>> {
            Ok(Transformed::new(Box::new(Unflushable(stream)) as ByteWriter))
        }
    }

    impl Middleware for BrokenSink {
        fn name(&self) -> &str {
            "broken-sink"
        }

        fn writable(&self) -> Option<&dyn StreamTransform<ByteWriter>> {
            Some(self)
        }
    }

    struct Reject;

    #[async_trait]
    impl StreamTransform<ByteWriter> for Reject {
        async fn transform(
            &self,
            _stream: ByteWriter,
            _metadata: &Metadata,
            _options: &TransformOptions,
        ) -> MiddlewareResult<Transformed<ByteWriter>> {
            Err(MiddlewareError::failed("reject", "quota exceeded"))
        }
    }

    impl Middleware for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        fn writable(&self) -> Option<&dyn StreamTransform<ByteWriter>> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn middleware_metadata_is_stored_at_create() {
        let (store, _) = store();
        store.use_middleware(Tag("first")).use_middleware(Tag("second"));

        let mut options = TransformOptions::new();
        options.insert("owner".into(), json!("ops"));
        let mut change = store.create(&options).await.unwrap();
        change.write_all(b"tagged").await.unwrap();
        let item = change.commit().await.unwrap();

        assert_eq!(item.metadata().get("tags"), Some(&json!(["first", "second"])));
        assert_eq!(item.metadata().get("owner"), Some(&json!("ops")));
    }

    #[tokio::test]
    async fn read_middleware_transforms_content() {
        let (store, _) = store();
        store.use_middleware(Upper);
        let mut item = put(&store, "quiet").await;
        assert_eq!(read_all(&mut item).await, "QUIET");
    }

    #[tokio::test]
    async fn failed_finalize_cleans_up_and_returns_error() {
        let (store, adapter) = store();
        store.use_middleware(BrokenSink);

        let mut change = store.create(&TransformOptions::new()).await.unwrap();
        change.write_all(b"doomed").await.unwrap();
        let err = change.commit().await.unwrap_err();

        assert!(matches!(err, DbError::Io(ref e) if e.to_string() == "device gone"));
        assert!(adapter.is_empty());
        assert!(store.get(change.id().as_str()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn failed_middleware_at_create_leaves_no_artifacts() {
        let (store, adapter) = store();
        store.use_middleware(Reject);

        let err = store.create(&TransformOptions::new()).await.unwrap_err();
        assert!(matches!(err, DbError::Middleware(MiddlewareError::Failed { .. })));
        assert!(adapter.is_empty());
    }
}
