//! Trackdoc change-tracking engine
//!
//! This crate lets application code mutate an in-memory document tree of
//! records, lists, sets and maps as ordinary containers while every
//! structural change is recorded as a dot-path diff. A save layer can then
//! send a minimal partial update instead of rewriting the whole document.
//!
//! # Architecture
//!
//! ```text
//! mutation → change lock → container listener → node path → root dirty set
//! ```
//!
//! - **Listenable containers** report each state change synchronously to
//!   one listener, with a change lock that pairs mutation and notification.
//! - **Document tree**: containers and records are linked into an arena by
//!   the segment their parent holds them under. Outermost notifications
//!   record a path in the root's dirty set, which keeps only the minimal,
//!   non-overlapping set of touched paths.
//! - **Attributes**: per-node auxiliary state lives in identity-keyed
//!   attribute stores backed by a per-model constant pool.
//!
//! # Example
//!
//! ```rust
//! use trackdoc_core::prelude::*;
//!
//! let model = DocumentModel::new(TrackingConfig::default()).unwrap();
//! let schema = Schema::builder("Player")
//!     .field("name", FieldKind::Scalar(ScalarType::String))
//!     .field("stats", FieldKind::Map(ElementKind::Scalar(ScalarType::Int)))
//!     .key_fields(["name"])
//!     .build()
//!     .unwrap();
//! model.register(schema).unwrap();
//!
//! let doc = Document::new(&model, "Player").unwrap();
//! assert!(!doc.is_dirty());
//!
//! doc.root().get_map("stats").unwrap().put("level", 3).unwrap();
//! assert_eq!(doc.dirty_paths(), vec![DotPath::from("stats.level")]);
//! ```

#![warn(missing_debug_implementations)]

pub mod attribute;
pub mod config;
pub mod error;
pub mod listenable;
pub mod model;
pub mod schema;
pub mod tree;

// Re-export main types
pub use attribute::{AttributeKey, AttributeMap, AttributeStoreKind, ConstantPool, NodeAttributes};
pub use config::TrackingConfig;
pub use error::{ConfigError, Result, SchemaError, TrackError};
pub use listenable::{Change, ChangeContext, ChangeListener, ChangeLock, LockMode};
pub use model::DocumentModel;
pub use schema::{ElementKind, FieldKind, IdentityDecl, ScalarType, Schema, SchemaBuilder};
pub use trackdoc_types::{DotPath, SaveMode, SaveResult, Segment};
pub use tree::{DirtySnapshot, Document, DocumentTree, Record, TrackedList, TrackedMap, TrackedSet, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::TrackingConfig;
    pub use crate::listenable::LockMode;
    pub use crate::model::DocumentModel;
    pub use crate::schema::{ElementKind, FieldKind, ScalarType, Schema};
    pub use crate::tree::{Document, Record, TrackedList, TrackedMap, TrackedSet, Value};
    pub use trackdoc_types::{DotPath, SaveMode, SaveResult};
}
