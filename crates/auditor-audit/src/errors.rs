use thiserror::Error;

/// Errors raised by the audit logger, restore-bundle writer, and
/// processing-state store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error opening or appending to an audit/log/state file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A diff/patch application failed.
    #[error("diff/patch error: {0}")]
    DiffError(String),

    /// A value could not be serialized for hashing or persistence.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record was requested by id that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying sqlite store returned an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `reset()` was called without the expected confirmation token.
    #[error("confirmation required to reset the processing-state store")]
    ConfirmationRequired,
}

/// Result type for `auditor-audit` operations.
pub type Result<T> = std::result::Result<T, Error>;
