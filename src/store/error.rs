//! Error type shared by every store backend.

/// Coarse error category for callers that map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The thread (or post) does not exist.
    NotFound,
    /// A bulk insert referenced a parent post that is missing or in another thread.
    ParentPostNotExist,
    /// A uniqueness constraint was violated.
    Conflict,
    /// Anything else: connectivity, malformed data, unexpected results.
    StorageFailure,
}

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lookup matched nothing.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Parent post does not exist in the target thread.
    #[error("Parent post does not exist: {0}")]
    ParentPostNotExist(String),
    /// Uniqueness conflict (e.g. duplicate thread slug).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A chunk insert kept returning no rows.
    #[error("Chunk {chunk} returned no rows after {attempts} attempts")]
    ChunkNotPersisted {
        /// Zero-based chunk index within the batch.
        chunk: usize,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Storage returned something inconsistent.
    #[error("Storage error: {0}")]
    Storage(String),
    /// Database error.
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ParentPostNotExist(_) => ErrorKind::ParentPostNotExist,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ChunkNotPersisted { .. } | Self::Storage(_) => ErrorKind::StorageFailure,
            #[cfg(feature = "postgres")]
            Self::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            #[cfg(feature = "postgres")]
            Self::Database(_) => ErrorKind::StorageFailure,
        }
    }

    /// Create a storage error from any error type.
    pub fn from_storage<E: std::error::Error>(e: E) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
