//! Building trees from persisted JSON
//!
//! The inverse of `to_json`: every field is read from its persisted segment
//! and converted according to its declared kind. Nothing built here is
//! linked or recorded; the caller attaches the finished root.

use super::record::Record;
use super::value::Value;
use crate::error::{Result, TrackError};
use crate::model::DocumentModel;
use crate::schema::{ElementKind, FieldKind, ScalarType, Schema};
use serde_json::Value as Json;
use std::sync::Arc;

struct Loader<'a> {
    model: &'a DocumentModel,
    schema: &'a str,
}

impl Loader<'_> {
    fn fail(&self, reason: String) -> TrackError {
        TrackError::Load {
            schema: self.schema.to_string(),
            reason,
        }
    }

    fn record(&self, schema: &Arc<Schema>, json: &Json) -> Result<Arc<Record>> {
        let object = json
            .as_object()
            .ok_or_else(|| self.fail(format!("expected an object for `{}`", schema.name())))?;

        let mut fields = Vec::new();
        for field in schema.fields() {
            let value = match object.get(&field.segment) {
                Some(json) => Some(self.field(&field.kind, json, &field.segment)?),
                None => self.model.default_value(&field.kind),
            };
            if let Some(value) = value {
                fields.push((field.segment.clone(), value));
            }
        }
        for key in object.keys() {
            if schema.field_by_segment(key).is_none() {
                tracing::debug!(schema = schema.name(), key = %key, "ignoring undeclared field");
            }
        }
        Ok(self.model.record_with(schema, fields))
    }

    fn field(&self, kind: &FieldKind, json: &Json, at: &str) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match kind {
            FieldKind::Scalar(scalar) => self.scalar(*scalar, json, at),
            FieldKind::Version => json
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| self.fail(format!("`{}` must be an integer version", at))),
            FieldKind::List(element) => {
                let items = self.array(json, at)?;
                let values = items
                    .iter()
                    .map(|item| self.element(element, item, at))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(self.model.list_with(values)))
            }
            FieldKind::Set(element) => {
                let items = self.array(json, at)?;
                let values = items
                    .iter()
                    .map(|item| self.element(element, item, at))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Set(self.model.set_with(values)))
            }
            FieldKind::Map(element) => {
                let object = json
                    .as_object()
                    .ok_or_else(|| self.fail(format!("`{}` must be an object", at)))?;
                let entries = object
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.element(element, item, at)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Map(self.model.map_with(entries)))
            }
            FieldKind::Record(schema) => Ok(Value::Record(self.record(schema, json)?)),
        }
    }

    fn element(&self, kind: &ElementKind, json: &Json, at: &str) -> Result<Value> {
        match kind {
            ElementKind::Scalar(scalar) => self.scalar(*scalar, json, at),
            ElementKind::Record(schema) if !json.is_null() => Ok(Value::Record(self.record(schema, json)?)),
            ElementKind::Record(_) => Ok(Value::Null),
        }
    }

    fn array<'j>(&self, json: &'j Json, at: &str) -> Result<&'j Vec<Json>> {
        json.as_array()
            .ok_or_else(|| self.fail(format!("`{}` must be an array", at)))
    }

    fn scalar(&self, scalar: ScalarType, json: &Json, at: &str) -> Result<Value> {
        let value = match (scalar, json) {
            (_, Json::Null) => Some(Value::Null),
            (ScalarType::Any, _) => Some(self.any(json)),
            (ScalarType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (ScalarType::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
            (ScalarType::Double, Json::Number(n)) => n.as_f64().map(Value::Double),
            (ScalarType::String, Json::String(s)) => Some(Value::String(s.clone())),
            _ => None,
        };
        value.ok_or_else(|| self.fail(format!("`{}` holds {} where {:?} was declared", at, json, scalar)))
    }

    /// Untyped values become scalars, lists and maps
    fn any(&self, json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Double(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(self.model.list_with(items.iter().map(|i| self.any(i)).collect())),
            Json::Object(object) => Value::Map(
                self.model
                    .map_with(object.iter().map(|(k, v)| (k.clone(), self.any(v))).collect()),
            ),
        }
    }
}

/// Build an unlinked record of `schema` from its persisted form
pub(crate) fn record_from_json(model: &DocumentModel, schema: &Arc<Schema>, json: &Json) -> Result<Arc<Record>> {
    Loader {
        model,
        schema: schema.name(),
    }
    .record(schema, json)
}
