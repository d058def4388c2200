//! Crate-wide error type for the index engine.

use thiserror::Error;

/// Errors surfaced by the crawl-and-index engine.
///
/// Every public operation (ingest, query, mutation, migration, lock) maps
/// onto one of these kinds. Ingest-time parse/validation failures never
/// reach this type directly — they are absorbed into `IngestOutcome`
/// (see `crate::ingest`) and only escalate to `ArchiveUnreadable` when the
/// archive read itself fails.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Caller supplied ill-typed or out-of-range input to a query/mutation API.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A URL could not be parsed or normalized to an origin.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// `get`/`edit` targeted a record that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON schema / shape validation rejected a record at write time.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Archive I/O failed during ingest; the caller should abort only the
    /// current dataset, not the whole crawl.
    #[error("archive unreadable: {0}")]
    ArchiveUnreadable(String),

    /// A unique-constraint violation that is fatal for the caller's dataset
    /// (follow-graph-like sets instead log and continue; see
    /// `IndexError::is_unique_violation` and `ingest::follows`).
    #[error("unique constraint violated: {0}")]
    UniqueConstraint(String),

    /// A non-tolerant migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// An archive load exceeded its timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// True when the underlying diesel error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            IndexError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}
