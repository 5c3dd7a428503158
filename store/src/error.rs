use thiserror::Error;

/// Errors surfaced by the persistence layer.
///
/// Filesystem and SQLite errors are wrapped rather than discarded so callers
/// can decide whether a failure is per-record recoverable or fatal to the
/// process (unrecoverable DB corruption aborts the caller's process).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unknown filter field {field:?} for collection {collection}")]
    UnknownField { collection: &'static str, field: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
