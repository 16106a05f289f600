use async_trait::async_trait;
use stow_adapter::{ByteReader, ByteWriter};
use stow_types::{Metadata, TransformOptions};

use crate::error::MiddlewareResult;

// ---------------------------------------------------------------------------
// Transformed
// ---------------------------------------------------------------------------

/// What a single transform hands back to the chain.
///
/// The stream is always returned: either the one that was passed in, or a
/// replacement wrapping it. `metadata` is `Some` only when the middleware
/// replaces the item's metadata; that marks the whole chain as having changed
/// metadata, even if the new value equals the old one.
pub struct Transformed<S> {
    /// The stream for the next middleware (and, at the end, the caller).
    pub stream: S,
    /// Replacement metadata, if any.
    pub metadata: Option<Metadata>,
}

impl<S> Transformed<S> {
    /// Pass `stream` on, with metadata left as it was.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            metadata: None,
        }
    }

    /// Replace the item's metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl<S> std::fmt::Debug for Transformed<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformed")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// StreamTransform / Middleware
// ---------------------------------------------------------------------------

/// One transform stage of a middleware, over read streams or write streams.
#[async_trait]
pub trait StreamTransform<S: Send + 'static>: Send + Sync {
    /// Transform `stream` given the item's current metadata and the caller's
    /// options. Returning an error aborts the whole chain.
    async fn transform(
        &self,
        stream: S,
        metadata: &Metadata,
        options: &TransformOptions,
    ) -> MiddlewareResult<Transformed<S>>;
}

/// A pluggable stage in the middleware chain.
///
/// Both capability accessors default to `None`; a middleware implements
/// [`StreamTransform`] for the stream types it cares about and returns
/// `Some(self)` from the matching accessor. Middleware without a given
/// capability is skipped for that stage.
///
/// The trait is object-safe and `Send + Sync` so middleware can be stored in
/// a `Vec<Arc<dyn Middleware>>`.
pub trait Middleware: Send + Sync {
    /// Human-readable name, used in logs and error reports.
    fn name(&self) -> &str;

    /// The read-side transform, if this middleware has one.
    fn readable(&self) -> Option<&dyn StreamTransform<ByteReader>> {
        None
    }

    /// The write-side transform, if this middleware has one.
    fn writable(&self) -> Option<&dyn StreamTransform<ByteWriter>> {
        None
    }
}
