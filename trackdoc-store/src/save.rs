//! Key-based save protocol with optimistic concurrency
//!
//! A save reads the document's dirty snapshot and persisted form, builds
//! the identity filter, and either inserts the whole document or sends a
//! partial update built from the dirty paths. When the schema declares a
//! version field every update is conditioned on the last known version
//! and increments it by one; an update that matches nothing while the
//! identity still exists is a version conflict.
//!
//! On success the dirty set is settled against the snapshot the save
//! started from, so paths recorded while the save was in flight survive.
//! On failure the dirty set is left as it was.

use crate::error::{Result, SaveError, StoreError};
use crate::filter::{lookup, Filter};
use crate::metrics::SaveMetrics;
use crate::store::{DocumentStore, VersionMatch};
use crate::update::UpdateDoc;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Instant;
use trackdoc_core::{DirtySnapshot, Document, DocumentModel, TrackError};
use trackdoc_types::{DotPath, SaveMode, SaveResult};

/// Everything one save needs, captured up front
struct Pending<'a> {
    doc: &'a Document,
    dirty: DirtySnapshot,
    json: Json,
    key: Filter,
    version: Option<&'a str>,
}

impl Pending<'_> {
    fn collection(&self) -> &str {
        self.doc.schema().collection()
    }

    fn version_match(&self) -> Option<VersionMatch> {
        self.version
            .map(|field| VersionMatch::new(field, self.doc.version(field)))
    }

    /// Record a successful write on the local document
    fn commit(&self, version: Option<i64>) {
        if let (Some(field), Some(version)) = (self.version, version) {
            self.doc.set_version_untracked(field, version);
        }
        self.doc.mark_persisted();
        if !self.doc.settle(&self.dirty) {
            tracing::debug!(
                collection = self.collection(),
                "document changed during save; dirty paths kept"
            );
        }
    }
}

#[derive(Debug)]
pub struct DocumentSaver<S> {
    store: S,
    metrics: SaveMetrics,
}

impl<S: DocumentStore> DocumentSaver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            metrics: SaveMetrics::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &SaveMetrics {
        &self.metrics
    }

    /// Save `doc` under `mode`, using the schema's version field if any
    pub fn save(&self, doc: &Document, mode: SaveMode) -> Result<SaveResult> {
        // Snapshot before serializing: anything recorded afterwards must
        // not be settled by this save.
        let dirty = doc.dirty_snapshot();
        let updating = match mode {
            SaveMode::InsertOnly => false,
            SaveMode::UpdateOnly => true,
            SaveMode::InsertOrUpdate => doc.is_persisted(),
        };
        if updating && dirty.paths.is_empty() {
            return Ok(self.unchanged(doc));
        }

        let version = doc.schema().version_field();
        let pending = self.prepare(doc, dirty, version)?;
        tracing::debug!(
            collection = pending.collection(),
            ?mode,
            dirty = pending.dirty.paths.len(),
            persisted = doc.is_persisted(),
            "saving document"
        );

        match mode {
            SaveMode::InsertOnly => self.insert(&pending),
            SaveMode::UpdateOnly => self.update(&pending, false),
            SaveMode::InsertOrUpdate if updating => self.update(&pending, true),
            SaveMode::InsertOrUpdate => self.insert_or_replace(&pending),
        }
    }

    /// Update `doc` conditioned on the integer stored under `version_field`
    ///
    /// `version_field` is a persisted segment and takes precedence over the
    /// schema's own version declaration.
    pub fn cas_update(&self, doc: &Document, version_field: &str) -> Result<SaveResult> {
        let schema = doc.schema();
        if schema.field_by_segment(version_field).is_none() {
            return Err(TrackError::UnknownField {
                schema: schema.name().to_string(),
                field: version_field.to_string(),
            }
            .into());
        }
        let dirty = doc.dirty_snapshot();
        if dirty.paths.is_empty() {
            return Ok(self.unchanged(doc));
        }
        let pending = self.prepare(doc, dirty, Some(version_field))?;
        self.update(&pending, false)
    }

    /// Load the first stored document of `schema` matching `filter`
    pub fn load(&self, model: &Arc<DocumentModel>, schema: &str, filter: &Filter) -> Result<Option<Document>> {
        let collection = model.schema(schema)?.collection().to_string();
        let Some(json) = self.timed(|store| store.find_one(&collection, filter))? else {
            return Ok(None);
        };
        Ok(Some(Document::from_json(model, schema, &json)?))
    }

    fn prepare<'a>(&self, doc: &'a Document, dirty: DirtySnapshot, version: Option<&'a str>) -> Result<Pending<'a>> {
        let json = doc.to_json();
        let key = Filter::identity(doc.schema(), &json)?;
        Ok(Pending {
            doc,
            dirty,
            json,
            key,
            version,
        })
    }

    /// An update with no dirty paths never reaches the store
    fn unchanged(&self, doc: &Document) -> SaveResult {
        self.metrics.record_noop();
        tracing::trace!(collection = doc.schema().collection(), "nothing to save");
        SaveResult::noop()
    }

    fn timed<T>(&self, op: impl FnOnce(&S) -> std::result::Result<T, StoreError>) -> std::result::Result<T, StoreError> {
        let start = Instant::now();
        let result = op(&self.store);
        self.metrics.record_store_time(start.elapsed());
        result
    }

    /// Insert the full document, starting the version at 1 when unset
    fn try_insert(&self, pending: &Pending<'_>) -> std::result::Result<Option<i64>, StoreError> {
        let mut json = pending.json.clone();
        let version = match pending.version {
            Some(field) => {
                let current = pending.doc.version(field).unwrap_or(1);
                if let Some(object) = json.as_object_mut() {
                    object.insert(field.to_string(), Json::from(current));
                }
                Some(current)
            }
            None => None,
        };
        self.timed(|store| store.insert_one(pending.collection(), &pending.key, json))?;
        Ok(version)
    }

    fn insert(&self, pending: &Pending<'_>) -> Result<SaveResult> {
        match self.try_insert(pending) {
            Ok(version) => Ok(self.inserted(pending, version)),
            Err(StoreError::DuplicateKey { collection, filter }) => {
                self.metrics.record_duplicate();
                tracing::warn!(collection = %collection, filter = %filter, "insert rejected: identity exists");
                Err(SaveError::DuplicateIdentity { collection, filter })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn inserted(&self, pending: &Pending<'_>, version: Option<i64>) -> SaveResult {
        pending.commit(version);
        self.metrics.record_insert();
        tracing::info!(collection = pending.collection(), key = %pending.key, "inserted document");
        SaveResult::inserted()
    }

    /// Insert a new document, rewriting the stored one if the identity exists
    fn insert_or_replace(&self, pending: &Pending<'_>) -> Result<SaveResult> {
        match self.try_insert(pending) {
            Ok(version) => return Ok(self.inserted(pending, version)),
            Err(StoreError::DuplicateKey { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        tracing::debug!(
            collection = pending.collection(),
            key = %pending.key,
            "identity exists; replacing stored fields"
        );
        let mut update = UpdateDoc::full(&pending.json, pending.version);
        if let Some(field) = pending.version {
            update = update.inc(field, 1);
        }
        let outcome = self.timed(|store| store.update_one(pending.collection(), &pending.key, &update, None))?;
        if outcome.matched == 0 {
            // Removed between the insert attempt and the update.
            self.metrics.record_noop();
            return Ok(SaveResult::noop());
        }

        let version = match pending.version {
            Some(field) => {
                let stored = self.timed(|store| store.find_one(pending.collection(), &pending.key))?;
                stored
                    .as_ref()
                    .and_then(|doc| lookup(doc, &DotPath::from(field)))
                    .and_then(Json::as_i64)
            }
            None => None,
        };
        Ok(self.updated(pending, version))
    }

    fn updated(&self, pending: &Pending<'_>, version: Option<i64>) -> SaveResult {
        pending.commit(version);
        self.metrics.record_update();
        tracing::info!(collection = pending.collection(), key = %pending.key, ?version, "updated document");
        SaveResult::updated()
    }

    /// Send the dirty diff as a conditional update
    ///
    /// With `insert_missing` a document whose identity is gone is inserted
    /// again; otherwise the save reports neither insert nor update.
    fn update(&self, pending: &Pending<'_>, insert_missing: bool) -> Result<SaveResult> {
        let mut update = UpdateDoc::from_diff(&pending.dirty.paths, &pending.json, pending.version);
        if update.is_empty() {
            self.metrics.record_noop();
            pending.doc.settle(&pending.dirty);
            return Ok(SaveResult::noop());
        }

        let condition = pending.version_match();
        if let Some(field) = pending.version {
            update = update.inc(field, 1);
        }
        let outcome = self.timed(|store| {
            store.update_one(pending.collection(), &pending.key, &update, condition.as_ref())
        })?;
        if outcome.matched > 0 {
            let version = condition.map(|c| c.expected.map_or(1, |v| v + 1));
            return Ok(self.updated(pending, version));
        }

        let stored = self.timed(|store| store.find_one(pending.collection(), &pending.key))?;
        match stored {
            Some(stored) => {
                let expected = condition.as_ref().and_then(|c| c.expected);
                let actual = condition
                    .as_ref()
                    .and_then(|c| lookup(&stored, &c.field))
                    .and_then(Json::as_i64);
                self.metrics.record_conflict();
                tracing::warn!(
                    collection = pending.collection(),
                    key = %pending.key,
                    ?expected,
                    ?actual,
                    "version conflict"
                );
                Err(SaveError::CasConflict {
                    collection: pending.collection().to_string(),
                    expected,
                    actual,
                })
            }
            None if insert_missing => self.insert(pending),
            None => {
                self.metrics.record_noop();
                tracing::debug!(collection = pending.collection(), key = %pending.key, "no stored document to update");
                Ok(SaveResult::noop())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use trackdoc_core::prelude::*;

    fn model() -> Arc<DocumentModel> {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let note = Schema::builder("Note")
            .field("title", FieldKind::Scalar(ScalarType::String))
            .field("body", FieldKind::Scalar(ScalarType::String))
            .field("tags", FieldKind::Set(ElementKind::Scalar(ScalarType::String)))
            .key_fields(["title"])
            .version("rev")
            .build()
            .unwrap();
        model.register(note).unwrap();
        model
    }

    #[test]
    fn test_insert_initialises_version() {
        let model = model();
        let saver = DocumentSaver::new(MemoryStore::new());
        let doc = Document::new(&model, "Note").unwrap();
        doc.set("title", "todo").unwrap();

        let result = saver.save(&doc, SaveMode::InsertOnly).unwrap();
        assert!(result.is_inserted());
        assert!(!result.is_updated());
        assert_eq!(doc.version("rev"), Some(1));
        assert!(!doc.is_dirty());
        assert!(doc.is_persisted());
        assert_eq!(
            saver.store().documents("note"),
            vec![json!({"title": "todo", "tags": [], "rev": 1})]
        );
    }

    #[test]
    fn test_update_sends_only_dirty_paths() {
        let model = model();
        let saver = DocumentSaver::new(MemoryStore::new());
        let doc = Document::new(&model, "Note").unwrap();
        doc.set("title", "todo").unwrap();
        saver.save(&doc, SaveMode::InsertOrUpdate).unwrap();

        doc.set("body", "buy milk").unwrap();
        let result = saver.save(&doc, SaveMode::InsertOrUpdate).unwrap();
        assert!(result.is_updated());
        assert_eq!(doc.version("rev"), Some(2));
        assert_eq!(
            saver.store().documents("note"),
            vec![json!({"title": "todo", "body": "buy milk", "tags": [], "rev": 2})]
        );
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let model = model();
        let saver = DocumentSaver::new(MemoryStore::new());
        let doc = Document::new(&model, "Note").unwrap();
        doc.set("body", "orphan").unwrap();

        let err = saver.save(&doc, SaveMode::InsertOrUpdate).unwrap_err();
        assert!(matches!(err, SaveError::MissingIdentity { field, .. } if field == "title"));
        assert!(doc.is_dirty());
        assert_eq!(saver.store().operation_count(), 0);
    }

    #[test]
    fn test_fresh_document_update_skips_identity_and_store() {
        let model = model();
        let saver = DocumentSaver::new(MemoryStore::new());
        let doc = Document::new(&model, "Note").unwrap();

        assert!(saver.save(&doc, SaveMode::UpdateOnly).unwrap().is_noop());
        assert!(saver.cas_update(&doc, "rev").unwrap().is_noop());
        assert_eq!(saver.store().operation_count(), 0);
        assert_eq!(saver.metrics().snapshot().noops, 2);

        // Inserting still needs the identity.
        let err = saver.save(&doc, SaveMode::InsertOnly).unwrap_err();
        assert!(matches!(err, SaveError::MissingIdentity { .. }));
    }

    #[test]
    fn test_cas_update_requires_declared_field() {
        let model = model();
        let saver = DocumentSaver::new(MemoryStore::new());
        let doc = Document::new(&model, "Note").unwrap();
        doc.set("title", "todo").unwrap();

        let err = saver.cas_update(&doc, "generation").unwrap_err();
        assert!(matches!(err, SaveError::Track(TrackError::UnknownField { .. })));
    }
}
