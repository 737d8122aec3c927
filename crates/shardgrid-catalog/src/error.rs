//! Error types for the ShardGrid group catalog.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur while reading or writing group metadata.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open catalog: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("membership conflict: {0}")]
    Conflict(String),

    /// The backing store could not be reached at all.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}
