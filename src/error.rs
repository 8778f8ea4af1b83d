//! Error types for the quote engine and its persistence backend.

use thiserror::Error;

use crate::view_store::DocumentType;

/// Failures raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid quote JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid quote document: {0}")]
    InvalidDocument(String),
}

/// Failures raised by the collection, view-store and session layers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A path or field segment is empty or contains the separator.
    #[error("invalid key segment '{0}'")]
    InvalidSegment(String),

    /// An indexed key was requested with no category segment before the field.
    #[error("indexed key '{0}' needs at least one category segment")]
    EmptyCategoryPath(String),

    /// Entry indices start at 1.
    #[error("entry index must be a positive integer, got {0}")]
    InvalidIndex(u32),

    /// An operation that renumbers needs a key ending in an index.
    #[error("key '{0}' has no entry index")]
    NotIndexed(String),

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// Template keys of one category disagree on their category path.
    #[error("category '{0}' has an inconsistent field template")]
    InvalidTemplate(String),

    #[error("collection '{collection}' has no entry {index}")]
    EntryNotFound { collection: String, index: u32 },

    #[error("no control is bound to '{0}'")]
    MissingControl(String),

    #[error("key '{0}' is already bound to a control")]
    KeyInUse(String),

    #[error("a {0} quote operation is already in progress")]
    Busy(DocumentType),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
