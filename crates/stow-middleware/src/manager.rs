use std::sync::{Arc, RwLock};

use stow_adapter::{ByteReader, ByteWriter};
use stow_types::{Metadata, TransformOptions};
use tracing::debug;

use crate::error::MiddlewareResult;
use crate::middleware::{Middleware, StreamTransform};
use crate::transform::TransformResult;

// ---------------------------------------------------------------------------
// Stage selection
// ---------------------------------------------------------------------------

/// Selects which transform of a middleware applies to a stream type.
trait ChainStage: Send + Sized + 'static {
    const STAGE: &'static str;

    fn transform_of(middleware: &dyn Middleware) -> Option<&dyn StreamTransform<Self>>;
}

impl ChainStage for ByteReader {
    const STAGE: &'static str = "readable";

    fn transform_of(middleware: &dyn Middleware) -> Option<&dyn StreamTransform<Self>> {
        middleware.readable()
    }
}

impl ChainStage for ByteWriter {
    const STAGE: &'static str = "writable";

    fn transform_of(middleware: &dyn Middleware) -> Option<&dyn StreamTransform<Self>> {
        middleware.writable()
    }
}

// ---------------------------------------------------------------------------
// MiddlewareManager
// ---------------------------------------------------------------------------

/// Ordered, append-only collection of middleware.
///
/// Registration order is application order. Each transform run takes a
/// snapshot of the list when it starts, so middleware registered while a run
/// is in flight only affects later runs.
pub struct MiddlewareManager {
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareManager {
    /// Create a manager with no middleware.
    pub fn new() -> Self {
        Self {
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// Append a middleware to the end of the chain.
    pub fn register(&self, middleware: Arc<dyn Middleware>) {
        debug!(middleware = middleware.name(), "registering middleware");
        self.middlewares
            .write()
            .expect("lock poisoned")
            .push(middleware);
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.middlewares.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.middlewares.read().expect("lock poisoned").is_empty()
    }

    /// Run a read stream and its metadata through every middleware's
    /// read-side transform.
    pub async fn transform_readable(
        &self,
        stream: ByteReader,
        metadata: Metadata,
        options: &TransformOptions,
    ) -> MiddlewareResult<TransformResult<ByteReader>> {
        self.transform(stream, metadata, options).await
    }

    /// Run a write stream and its metadata through every middleware's
    /// write-side transform.
    pub async fn transform_writable(
        &self,
        stream: ByteWriter,
        metadata: Metadata,
        options: &TransformOptions,
    ) -> MiddlewareResult<TransformResult<ByteWriter>> {
        self.transform(stream, metadata, options).await
    }

    /// Apply the chain sequentially; each middleware sees the previous one's
    /// output. The first error aborts the run.
    async fn transform<S: ChainStage>(
        &self,
        stream: S,
        metadata: Metadata,
        options: &TransformOptions,
    ) -> MiddlewareResult<TransformResult<S>> {
        let chain = self.middlewares.read().expect("lock poisoned").clone();
        let mut result = TransformResult::new(stream, metadata);

        for middleware in &chain {
            let Some(transform) = S::transform_of(middleware.as_ref()) else {
                continue;
            };
            let (stream, metadata, metadata_changed) = result.into_parts();
            let output = transform
                .transform(stream, &metadata, options)
                .await
                .inspect_err(|err| {
                    debug!(middleware = middleware.name(), stage = S::STAGE, error = %err, "middleware failed");
                })?;
            result = TransformResult::fold(output, metadata, metadata_changed);
        }

        debug!(
            stage = S::STAGE,
            middleware_count = chain.len(),
            metadata_changed = result.metadata_changed,
            "transform chain complete"
        );
        Ok(result)
    }
}

impl Default for MiddlewareManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .middlewares
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        f.debug_struct("MiddlewareManager")
            .field("middlewares", &names)
            .finish()
    }
}
