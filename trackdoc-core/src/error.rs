//! Error types for the tracking engine

use thiserror::Error;

/// Runtime errors raised while mutating or wiring a document tree
#[derive(Debug, Error)]
pub enum TrackError {
    /// Field is not declared by the record's schema
    #[error("unknown field `{field}` on record `{schema}`")]
    UnknownField { schema: String, field: String },

    /// Value kind does not match the declared field kind
    #[error("field `{field}` on `{schema}` expects {expected}, got {actual}")]
    TypeMismatch {
        schema: String,
        field: String,
        expected: String,
        actual: &'static str,
    },

    /// Node already occupies a slot in a live tree
    #[error("node is already attached at `{0}`")]
    AlreadyAttached(String),

    /// Sequence index outside the current bounds
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Map key cannot be rendered as a path segment
    #[error("map key `{0}` cannot be used as a path segment")]
    InvalidKey(String),

    /// A listener rejected a change notification
    #[error("listener failed: {0}")]
    Listener(String),

    /// Attribute key name registered twice through `new_instance`
    #[error("attribute key `{0}` already exists")]
    DuplicateAttributeKey(String),

    /// No schema registered under this name
    #[error("schema `{0}` is not registered")]
    UnknownSchema(String),

    /// Persisted layout does not match the schema
    #[error("cannot load `{schema}`: {reason}")]
    Load { schema: String, reason: String },

    /// Document type failed registration checks
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Invalid tracking configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration errors raised when a document type is registered
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("identity field `{field}` declared twice on `{schema}`")]
    DuplicateIdentityField { schema: String, field: String },

    #[error("schema `{0}` declares an empty identity field set")]
    EmptyIdentity(String),

    #[error("schema `{schema}` and its parent `{parent}` both declare an identity")]
    AmbiguousIdentity { schema: String, parent: String },

    #[error("field `{field}` declared twice on `{schema}`")]
    DuplicateField { schema: String, field: String },

    #[error("identity field `{field}` is not declared on `{schema}`")]
    UnknownIdentityField { schema: String, field: String },

    #[error("composite key `{field}` on `{schema}` must be a record field")]
    CompositeKeyNotRecord { schema: String, field: String },

    #[error("version field `{field}` on `{schema}` must be declared with the version kind")]
    InvalidVersionField { schema: String, field: String },

    #[error("field `{field}` on `{schema}` cannot be persisted as `{segment}`")]
    InvalidSegment {
        schema: String,
        field: String,
        segment: String,
    },

    #[error("schema `{0}` declares more than one identity")]
    ConflictingIdentity(String),

    #[error("schema `{0}` is already registered")]
    AlreadyRegistered(String),
}

/// Errors raised while loading tracking configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type using TrackError
pub type Result<T> = std::result::Result<T, TrackError>;
