/// Errors from storage adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The named file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The name cannot be used as a flat storage key.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Returns `true` if this error means the target did not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            Self::InvalidName(_) => false,
        }
    }
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Reject names that would escape a flat namespace.
pub(crate) fn validate_name(name: &str) -> AdapterResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AdapterError::InvalidName(name.to_string()));
    }
    Ok(())
}
