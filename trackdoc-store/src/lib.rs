//! Trackdoc save protocol
//!
//! Persists [`Document`](trackdoc_core::Document)s through a
//! [`DocumentStore`] using their identity fields as the key. New documents
//! are inserted whole; persisted ones send only their dirty paths as a
//! partial update, conditioned on the version counter when the schema
//! declares one.
//!
//! # Example
//!
//! ```rust
//! use trackdoc_core::prelude::*;
//! use trackdoc_store::{DocumentSaver, MemoryStore};
//!
//! let model = DocumentModel::new(TrackingConfig::default()).unwrap();
//! let schema = Schema::builder("Player")
//!     .field("name", FieldKind::Scalar(ScalarType::String))
//!     .field("level", FieldKind::Scalar(ScalarType::Int))
//!     .key_fields(["name"])
//!     .version("version")
//!     .build()
//!     .unwrap();
//! model.register(schema).unwrap();
//!
//! let saver = DocumentSaver::new(MemoryStore::new());
//! let doc = Document::new(&model, "Player").unwrap();
//! doc.set("name", "ada").unwrap();
//! assert!(saver.save(&doc, SaveMode::InsertOrUpdate).unwrap().is_inserted());
//!
//! doc.set("level", 2).unwrap();
//! assert!(saver.save(&doc, SaveMode::InsertOrUpdate).unwrap().is_updated());
//! assert_eq!(doc.version("version"), Some(2));
//! ```

pub mod error;
pub mod filter;
pub mod metrics;
pub mod save;
pub mod store;
pub mod update;

pub use error::{Result, SaveError, StoreError};
pub use filter::Filter;
pub use metrics::{SaveMetrics, SaveMetricsSnapshot};
pub use save::DocumentSaver;
pub use store::{DocumentStore, MemoryStore, StoreResult, UpdateOutcome, VersionMatch};
pub use update::UpdateDoc;
