/// Errors raised while running the middleware chain.
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    /// A middleware rejected the stream or metadata.
    #[error("middleware '{middleware}' failed: {message}")]
    Failed { middleware: String, message: String },

    /// A middleware hit an I/O error while setting up its stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MiddlewareError {
    /// Create a failure attributed to the named middleware.
    pub fn failed(middleware: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            middleware: middleware.into(),
            message: message.into(),
        }
    }
}

/// Result alias for middleware operations.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;
