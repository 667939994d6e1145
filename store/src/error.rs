//! Store error type.

use std::path::PathBuf;

/// Failure of the storage collaborator.
///
/// Everything here means "storage unavailable or damaged" — the one error
/// class a caller may retry with backoff. Expected rejections (conflict,
/// not-found) are not errors at this layer; they are [`crate::Transition`]
/// outcomes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database path {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage lock poisoned by an earlier panic")]
    Poisoned,

    #[error("stored row is malformed: {0}")]
    Corrupt(String),
}
