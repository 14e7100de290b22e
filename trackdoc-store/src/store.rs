//! Persistence collaborator
//!
//! The save protocol talks to storage only through [`DocumentStore`]:
//! find by filter, insert under an identity, and update with an optional
//! version condition. [`MemoryStore`] implements it over in-process JSON
//! documents.

use crate::error::StoreError;
use crate::filter::{lookup, Filter};
use crate::update::UpdateDoc;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use trackdoc_types::DotPath;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Condition on the stored version counter
///
/// `expected: None` matches documents where the field is absent or null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMatch {
    pub field: DotPath,
    pub expected: Option<i64>,
}

impl VersionMatch {
    pub fn new(field: impl Into<DotPath>, expected: Option<i64>) -> Self {
        Self {
            field: field.into(),
            expected,
        }
    }

    pub fn matches(&self, document: &Json) -> bool {
        let stored = lookup(document, &self.field).filter(|v| !v.is_null());
        match (stored, self.expected) {
            (None, None) => true,
            (Some(value), Some(expected)) => value.as_i64() == Some(expected),
            _ => false,
        }
    }
}

/// Counts reported by an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

pub trait DocumentStore: Send + Sync {
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Json>>;

    /// Insert `document`; fails with [`StoreError::DuplicateKey`] when
    /// another document already matches `key`
    fn insert_one(&self, collection: &str, key: &Filter, document: Json) -> StoreResult<()>;

    /// Update the first document matching `filter` and `version`
    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
        version: Option<&VersionMatch>,
    ) -> StoreResult<UpdateOutcome>;
}

/// In-memory store; every operation runs under one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Json>>>,
    operations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations issued so far
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    /// Copy of every document in `collection`
    pub fn documents(&self, collection: &str) -> Vec<Json> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.lock().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Json>> {
        self.count();
        let collections = self.collections.lock();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    fn insert_one(&self, collection: &str, key: &Filter, document: Json) -> StoreResult<()> {
        self.count();
        if !document.is_object() {
            return Err(StoreError::Backend("documents must be JSON objects".into()));
        }

        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|doc| key.matches(doc)) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                filter: key.to_string(),
            });
        }
        tracing::trace!(collection, key = %key, "insert");
        docs.push(document);
        Ok(())
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
        version: Option<&VersionMatch>,
    ) -> StoreResult<UpdateOutcome> {
        self.count();
        let mut collections = self.collections.lock();
        let target = collections.get_mut(collection).and_then(|docs| {
            docs.iter_mut()
                .find(|doc| filter.matches(doc) && version.map_or(true, |v| v.matches(doc)))
        });
        let Some(document) = target else {
            return Ok(UpdateOutcome::default());
        };

        let before = document.clone();
        update.apply_to(document);
        tracing::trace!(collection, filter = %filter, update = %update.to_json(), "update");
        Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(*document != before),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_rejects_duplicate_key() {
        let store = MemoryStore::new();
        let key = Filter::eq("name", "ada");
        store.insert_one("players", &key, json!({"name": "ada"})).unwrap();

        let err = store
            .insert_one("players", &key, json!({"name": "ada", "level": 2}))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.len("players"), 1);
        assert_eq!(store.operation_count(), 2);
    }

    #[test]
    fn test_update_respects_version() {
        let store = MemoryStore::new();
        let key = Filter::eq("name", "ada");
        store
            .insert_one("players", &key, json!({"name": "ada", "version": 3}))
            .unwrap();
        let update = UpdateDoc::new().set("level", 4).inc("version", 1);

        let stale = VersionMatch::new("version", Some(2));
        let outcome = store.update_one("players", &key, &update, Some(&stale)).unwrap();
        assert_eq!(outcome, UpdateOutcome::default());

        let current = VersionMatch::new("version", Some(3));
        let outcome = store.update_one("players", &key, &update, Some(&current)).unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });
        assert_eq!(
            store.find_one("players", &key).unwrap(),
            Some(json!({"name": "ada", "version": 4, "level": 4}))
        );
    }

    #[test]
    fn test_missing_version_matches_absent_field() {
        let condition = VersionMatch::new("version", None);
        assert!(condition.matches(&json!({"name": "ada"})));
        assert!(condition.matches(&json!({"version": null})));
        assert!(!condition.matches(&json!({"version": 1})));
    }

    #[test]
    fn test_unchanged_update_is_not_modified() {
        let store = MemoryStore::new();
        let key = Filter::eq("name", "ada");
        store.insert_one("players", &key, json!({"name": "ada", "level": 1})).unwrap();

        let update = UpdateDoc::new().set("level", 1);
        let outcome = store.update_one("players", &key, &update, None).unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 0 });
        assert!(store.find_one("nobody", &key).unwrap().is_none());
    }
}
