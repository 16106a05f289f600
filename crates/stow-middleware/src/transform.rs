use stow_types::Metadata;

use crate::middleware::Transformed;

/// The accumulated outcome of running a stream through the whole chain.
pub struct TransformResult<S> {
    /// The final stream.
    pub stream: S,
    /// The final metadata.
    pub metadata: Metadata,
    /// Whether any middleware supplied replacement metadata. Once set, never
    /// reset by later middleware.
    pub metadata_changed: bool,
}

impl<S> TransformResult<S> {
    /// Start accumulating from the raw stream and the item's metadata.
    pub fn new(stream: S, metadata: Metadata) -> Self {
        Self {
            stream,
            metadata,
            metadata_changed: false,
        }
    }

    /// Split into the running stream and the state it is checked against, so
    /// the stream can be moved into the next middleware.
    pub(crate) fn into_parts(self) -> (S, Metadata, bool) {
        (self.stream, self.metadata, self.metadata_changed)
    }

    /// Fold one middleware's output onto the state taken by [`into_parts`].
    ///
    /// The returned stream always wins. Supplied metadata replaces the
    /// running metadata and marks it changed.
    ///
    /// [`into_parts`]: Self::into_parts
    pub(crate) fn fold(output: Transformed<S>, metadata: Metadata, metadata_changed: bool) -> Self {
        match output.metadata {
            Some(replacement) => Self {
                stream: output.stream,
                metadata: replacement,
                metadata_changed: true,
            },
            None => Self {
                stream: output.stream,
                metadata,
                metadata_changed,
            },
        }
    }
}

impl<S> std::fmt::Debug for TransformResult<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformResult")
            .field("metadata", &self.metadata)
            .field("metadata_changed", &self.metadata_changed)
            .finish_non_exhaustive()
    }
}
