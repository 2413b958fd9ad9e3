//! Library error types.

/// Errors surfaced by the storage, ingestion, and query layers.
///
/// Lookups that find nothing return `Ok(None)` rather than an error.
/// Scheduler execution failures are recorded in scheduler status and do not
/// flow through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input rejected before any storage access.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying SQLite failure. Aborts the enclosing transaction.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
