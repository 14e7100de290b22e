//! Error types for the save protocol

use thiserror::Error;
use trackdoc_core::TrackError;

/// Failures reported by a [`DocumentStore`](crate::DocumentStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit an existing identity
    #[error("duplicate key in `{collection}`: {filter}")]
    DuplicateKey { collection: String, filter: String },

    /// The backend could not run the operation
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Save outcomes the caller has to handle
#[derive(Debug, Error)]
pub enum SaveError {
    /// An insert-only save found the identity already stored
    #[error("document with {filter} already exists in `{collection}`")]
    DuplicateIdentity { collection: String, filter: String },

    /// The stored version moved since this document last read it
    #[error("version conflict in `{collection}`: expected {expected:?}, found {actual:?}")]
    CasConflict {
        collection: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    /// An identity field is null or absent
    #[error("identity field `{field}` of `{schema}` has no value")]
    MissingIdentity { schema: String, field: String },

    /// The same field appears twice in one equality filter
    #[error("field `{0}` appears twice in the filter")]
    DuplicateFilterField(String),

    #[error("a filter needs at least one field")]
    EmptyFilter,

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SaveError {
    /// True for failures a caller may retry after reloading
    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveError::CasConflict { .. })
    }
}

/// Result type for save operations
pub type Result<T> = std::result::Result<T, SaveError>;
