use std::path::PathBuf;
use std::time::Duration;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Error reported by the underlying storage engine.
    #[error("storage engine error: {0}")]
    Engine(String),

    /// I/O error outside the engine (permissions, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// A mutating call was made on a read transaction.
    #[error("write attempted inside a read transaction")]
    ReadOnlyTransaction,

    /// Another handle kept the file locked for longer than the open timeout.
    #[error("timed out after {timeout:?} waiting for the lock on {}", .path.display())]
    OpenTimeout { path: PathBuf, timeout: Duration },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

macro_rules! impl_engine_error_from {
    ($($error_type:ty),*) => {
        $(
            impl From<$error_type> for StoreError {
                fn from(err: $error_type) -> Self {
                    Self::Engine(err.to_string())
                }
            }
        )*
    };
}

impl_engine_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);
