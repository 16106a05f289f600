use stow_adapter::AdapterError;
use stow_middleware::MiddlewareError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("item does not exist: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("malformed metadata for item {id}: {source}")]
    MalformedMetadata {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("middleware error: {0}")]
    Middleware(#[from] MiddlewareError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Returns `true` for a missing item or a missing storage artifact.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Adapter(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` for API misuse, such as committing a change twice.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

pub type DbResult<T> = Result<T, DbError>;
