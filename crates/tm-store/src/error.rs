use tm_core::{Classify, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {id}")]
    NotFound { id: String },

    #[error("content changed since read: expected {expected}, found {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Path(#[from] tm_core::CoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parent directory does not exist: {0}")]
    ParentMissing(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::HashMismatch { .. } => ErrorKind::Conflict,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Path(e) => e.kind(),
            StoreError::Io(_) => ErrorKind::Internal,
            StoreError::ParentMissing(_) => ErrorKind::Internal,
            StoreError::AlreadyExists(_) => ErrorKind::Conflict,
        }
    }
}
