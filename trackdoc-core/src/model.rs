//! Document model
//!
//! The [`DocumentModel`] is initialised once by the application. It owns
//! the constant pool backing node attributes, the schema registry and the
//! tracking configuration, and it is the factory for every container and
//! record so that they all share one lock mode and attribute store.

use crate::attribute::ConstantPool;
use crate::config::TrackingConfig;
use crate::error::{Result, SchemaError, TrackError};
use crate::schema::{FieldKind, Schema};
use crate::tree::{NodeCore, NodeKeys, Record, TrackedList, TrackedMap, TrackedSet, Value};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

pub struct DocumentModel {
    config: TrackingConfig,
    pool: ConstantPool,
    keys: Arc<NodeKeys>,
    schemas: DashMap<String, Arc<Schema>>,
}

impl DocumentModel {
    pub fn new(config: TrackingConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let pool = ConstantPool::new();
        let keys = Arc::new(NodeKeys::register(&pool)?);
        tracing::debug!(?config, "initialised document model");
        Ok(Arc::new(Self {
            config,
            pool,
            keys,
            schemas: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Register a document type; names are unique per model
    pub fn register(&self, schema: Arc<Schema>) -> std::result::Result<(), SchemaError> {
        match self.schemas.entry(schema.name().to_string()) {
            Entry::Occupied(entry) => Err(SchemaError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(schema = %schema, "registered schema");
                entry.insert(schema);
                Ok(())
            }
        }
    }

    pub fn schema(&self, name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TrackError::UnknownSchema(name.to_string()))
    }

    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn node_core(&self) -> NodeCore {
        NodeCore::new(
            self.keys.clone(),
            self.config.attribute_store,
            self.config.attribute_buckets,
        )
    }

    pub fn list(&self) -> Arc<TrackedList> {
        self.list_with(Vec::new())
    }

    /// List holding `items`; nothing is recorded for them
    pub fn list_with(&self, items: Vec<Value>) -> Arc<TrackedList> {
        TrackedList::new(self.node_core(), self.config.lock_mode, items)
    }

    pub fn set(&self) -> Arc<TrackedSet> {
        self.set_with(Vec::new())
    }

    pub fn set_with(&self, items: Vec<Value>) -> Arc<TrackedSet> {
        TrackedSet::new(self.node_core(), self.config.lock_mode, items)
    }

    pub fn map(&self) -> Arc<TrackedMap> {
        self.map_with(Vec::new())
    }

    pub fn map_with(&self, entries: Vec<(String, Value)>) -> Arc<TrackedMap> {
        TrackedMap::new(self.node_core(), self.config.lock_mode, entries)
    }

    /// Record of `schema`, populated with defaults when configured
    pub fn record(&self, schema: &Arc<Schema>) -> Arc<Record> {
        let fields = schema
            .fields()
            .iter()
            .filter_map(|f| self.default_value(&f.kind).map(|v| (f.segment.clone(), v)))
            .collect();
        self.record_with(schema, fields)
    }

    pub(crate) fn record_with(&self, schema: &Arc<Schema>, fields: Vec<(String, Value)>) -> Arc<Record> {
        Record::new(self.node_core(), self.config.lock_mode, schema.clone(), fields)
    }

    /// Initial value of an absent field; only containers and records get one
    pub(crate) fn default_value(&self, kind: &FieldKind) -> Option<Value> {
        if !self.config.eager_defaults {
            return None;
        }
        match kind {
            FieldKind::List(_) => Some(Value::List(self.list())),
            FieldKind::Set(_) => Some(Value::Set(self.set())),
            FieldKind::Map(_) => Some(Value::Map(self.map())),
            FieldKind::Record(schema) => Some(Value::Record(self.record(schema))),
            FieldKind::Scalar(_) | FieldKind::Version => None,
        }
    }
}

impl fmt::Debug for DocumentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentModel")
            .field("config", &self.config)
            .field("schemas", &self.schema_names())
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;

    #[test]
    fn test_register_is_unique() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let schema = Schema::builder("Note")
            .field("body", FieldKind::Scalar(ScalarType::String))
            .build()
            .unwrap();

        model.register(schema.clone()).unwrap();
        assert_eq!(
            model.register(schema),
            Err(SchemaError::AlreadyRegistered("Note".into()))
        );
        assert_eq!(model.schema_names(), vec!["Note"]);
        assert!(matches!(model.schema("Other"), Err(TrackError::UnknownSchema(_))));
    }

    #[test]
    fn test_node_keys_are_registered_once_per_model() {
        let a = DocumentModel::new(TrackingConfig::default()).unwrap();
        let b = DocumentModel::new(TrackingConfig::default()).unwrap();
        assert_eq!(a.pool().len(), 3);
        assert_eq!(b.pool().len(), 3);
        assert!(a.pool().exists("trackdoc.node.link"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrackingConfig {
            attribute_buckets: 3,
            ..TrackingConfig::default()
        };
        assert!(matches!(DocumentModel::new(config), Err(TrackError::Config(_))));
    }
}
