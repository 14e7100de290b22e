//! Structured records

use super::containers::{KeyStyle, KeyedRecorder, TrackedList, TrackedMap, TrackedSet};
use super::node::{ensure_free, NodeCore, TreeNode};
use super::value::Value;
use crate::error::{Result, TrackError};
use crate::listenable::{ChangeLock, ListenableMap, LockMode};
use crate::schema::{FieldDescriptor, FieldKind, ScalarType, Schema};
use std::fmt;
use std::sync::Arc;
use trackdoc_types::{DotPath, Segment};

/// Record with the fixed fields of a [`Schema`]
///
/// Fields are stored under their persisted segment. Writing a field records
/// the field's path, which subsumes anything recorded below it.
pub struct Record {
    core: Arc<NodeCore>,
    schema: Arc<Schema>,
    fields: Arc<ListenableMap<String, Value>>,
}

impl Record {
    pub(crate) fn new(
        core: NodeCore,
        mode: LockMode,
        schema: Arc<Schema>,
        fields: Vec<(String, Value)>,
    ) -> Arc<Self> {
        let core = Arc::new(core);
        let fields = Arc::new(ListenableMap::from_entries(fields, mode));
        fields.set_listener(Arc::new(KeyedRecorder {
            core: core.clone(),
            style: KeyStyle::Field,
        }));
        Arc::new(Self { core, schema, fields })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> Option<DotPath> {
        self.core.path()
    }

    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    pub fn change_lock(&self) -> &ChangeLock {
        self.fields.change_lock()
    }

    fn descriptor(&self, name: &str) -> Result<&FieldDescriptor> {
        self.schema.field(name).ok_or_else(|| TrackError::UnknownField {
            schema: self.schema.name().to_string(),
            field: name.to_string(),
        })
    }

    /// Current value of a declared field; `None` when unset
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let field = self.descriptor(name)?;
        Ok(self.fields.get(&field.segment))
    }

    pub(crate) fn get_segment(&self, segment: &str) -> Option<Value> {
        self.fields.read(|fields| fields.get(segment).cloned())
    }

    /// Write a declared field, returning the previous value
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let field = self.descriptor(name)?;
        let value = value.into();
        if !accepts(&field.kind, &value) {
            return Err(TrackError::TypeMismatch {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
                expected: field.kind.describe(),
                actual: value.kind_name(),
            });
        }
        ensure_free(&value, self.fields.get(&field.segment).as_ref())?;
        self.fields.put(field.segment.clone(), value)
    }

    /// Remove a field's value; the field's path is recorded as unset
    pub fn unset(&self, name: &str) -> Result<Option<Value>> {
        let field = self.descriptor(name)?;
        self.fields.remove(&field.segment)
    }

    /// Write a scalar without recording anything
    pub(crate) fn put_untracked(&self, segment: &str, value: Value) -> Option<Value> {
        self.fields.put_unobserved(segment.to_string(), value)
    }

    /// Names of the fields currently holding a value, in schema order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.read(|fields| {
            self.schema
                .fields()
                .iter()
                .filter(|f| fields.contains_key(&f.segment))
                .map(|f| f.name.clone())
                .collect()
        })
    }

    /// Present fields keyed by segment
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.fields.entries()
    }

    pub fn get_list(&self, name: &str) -> Result<Arc<TrackedList>> {
        self.typed(name, "list", |v| v.as_list().cloned())
    }

    pub fn get_set(&self, name: &str) -> Result<Arc<TrackedSet>> {
        self.typed(name, "set", |v| v.as_set().cloned())
    }

    pub fn get_map(&self, name: &str) -> Result<Arc<TrackedMap>> {
        self.typed(name, "map", |v| v.as_map().cloned())
    }

    pub fn get_record(&self, name: &str) -> Result<Arc<Record>> {
        self.typed(name, "record", |v| v.as_record().cloned())
    }

    fn typed<T>(&self, name: &str, expected: &str, pick: impl FnOnce(&Value) -> Option<T>) -> Result<T> {
        let value = self.get(name)?;
        let actual = value.as_ref().map(Value::kind_name).unwrap_or("nothing");
        value.as_ref().and_then(pick).ok_or_else(|| TrackError::TypeMismatch {
            schema: self.schema.name().to_string(),
            field: name.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }

    /// Present fields under their persisted names
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.fields.read(|fields| {
            fields
                .iter()
                .map(|(segment, value)| (segment.clone(), value.to_json()))
                .collect()
        }))
    }
}

impl TreeNode for Record {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn children(&self) -> Vec<(Segment, Value)> {
        self.fields.read(|fields| {
            fields
                .iter()
                .filter(|(_, value)| value.as_node().is_some())
                .map(|(segment, value)| (Segment::field(segment.as_str()), value.clone()))
                .collect()
        })
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("schema", &self.schema.name())
            .field("fields", &*self.fields)
            .finish()
    }
}

/// Whether a field of `kind` may hold `value`; null is always accepted
fn accepts(kind: &FieldKind, value: &Value) -> bool {
    match (kind, value) {
        (_, Value::Null) => true,
        (FieldKind::Scalar(ScalarType::Any), _) => true,
        (FieldKind::Scalar(ScalarType::Bool), Value::Bool(_)) => true,
        (FieldKind::Scalar(ScalarType::Int), Value::Int(_)) => true,
        (FieldKind::Scalar(ScalarType::Double), Value::Double(_) | Value::Int(_)) => true,
        (FieldKind::Scalar(ScalarType::String), Value::String(_)) => true,
        (FieldKind::List(_), Value::List(_)) => true,
        (FieldKind::Set(_), Value::Set(_)) => true,
        (FieldKind::Map(_), Value::Map(_)) => true,
        (FieldKind::Record(schema), Value::Record(record)) => record.schema().name() == schema.name(),
        (FieldKind::Version, Value::Int(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentModel;
    use crate::schema::ElementKind;
    use crate::TrackingConfig;

    fn sample(model: &DocumentModel) -> Arc<Schema> {
        let schema = Schema::builder("Profile")
            .field_as("display", "d", FieldKind::Scalar(ScalarType::String))
            .field("score", FieldKind::Scalar(ScalarType::Double))
            .field("tags", FieldKind::Set(ElementKind::Scalar(ScalarType::String)))
            .key_fields(["display"])
            .build()
            .unwrap();
        model.register(schema.clone()).unwrap();
        schema
    }

    #[test]
    fn test_set_validates_field_and_kind() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let record = model.record(&sample(&model));

        assert!(matches!(record.set("nope", 1), Err(TrackError::UnknownField { .. })));
        assert!(matches!(
            record.set("display", 5),
            Err(TrackError::TypeMismatch { actual: "int", .. })
        ));

        record.set("display", "ada").unwrap();
        record.set("score", 3).unwrap();
        assert_eq!(record.get("display").unwrap(), Some(Value::from("ada")));
        assert_eq!(
            record.to_json(),
            serde_json::json!({"tags": [], "d": "ada", "score": 3})
        );
    }

    #[test]
    fn test_eager_defaults_and_typed_access() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let record = model.record(&sample(&model));

        assert!(record.get_set("tags").unwrap().is_empty());
        assert!(matches!(
            record.get_list("tags"),
            Err(TrackError::TypeMismatch { actual: "set", .. })
        ));
        assert_eq!(record.field_names(), vec!["tags"]);

        record.unset("tags").unwrap();
        assert!(record.get("tags").unwrap().is_none());
    }

    #[test]
    fn test_lazy_records_start_empty() {
        let config = TrackingConfig {
            eager_defaults: false,
            ..TrackingConfig::default()
        };
        let model = DocumentModel::new(config).unwrap();
        let record = model.record(&sample(&model));
        assert!(record.field_names().is_empty());
        assert!(record.get_set("tags").is_err());
    }
}
