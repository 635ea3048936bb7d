/// Errors from metadata store operations.
///
/// Every variant means the same thing to callers: the store could not do
/// what was asked, so the request that needed it fails.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The rotation singleton is missing; `ensure_schema` has not run.
    #[error("rotation state not initialized (ensure_schema has not run)")]
    SchemaMissing,

    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// No backend understands the connection URL.
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),

    /// I/O error preparing the backend (e.g. creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// In-process state guard was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
