//! Equality filters over persisted documents

use crate::error::{Result, SaveError};
use serde_json::Value as Json;
use std::collections::HashSet;
use std::fmt;
use trackdoc_core::Schema;
use trackdoc_types::DotPath;

/// Equality filter; a single field is never wrapped in `And`
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { path: DotPath, value: Json },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<DotPath>, value: impl Into<Json>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Build from `(field, value)` pairs; field names must be distinct
    pub fn from_pairs<I, P>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, Json)>,
        P: Into<DotPath>,
    {
        let mut seen = HashSet::new();
        let mut filters = Vec::new();
        for (path, value) in pairs {
            let path = path.into();
            if !seen.insert(path.clone()) {
                return Err(SaveError::DuplicateFilterField(path.to_string()));
            }
            filters.push(Filter::Eq { path, value });
        }

        match filters.len() {
            0 => Err(SaveError::EmptyFilter),
            1 => Ok(filters.remove(0)),
            _ => Ok(Filter::And(filters)),
        }
    }

    /// Identity filter of `schema` read from a persisted snapshot
    pub fn identity(schema: &Schema, snapshot: &Json) -> Result<Self> {
        let mut pairs = Vec::new();
        for field in schema.identity_fields() {
            let path = DotPath::new(field);
            match lookup(snapshot, &path) {
                Some(value) if !value.is_null() => pairs.push((path, value.clone())),
                _ => {
                    return Err(SaveError::MissingIdentity {
                        schema: schema.name().to_string(),
                        field: path.to_string(),
                    })
                }
            }
        }
        Self::from_pairs(pairs)
    }

    /// Conjunction of both filters, flattened
    pub fn and(self, other: Filter) -> Self {
        let mut filters = match self {
            Filter::And(filters) => filters,
            eq => vec![eq],
        };
        match other {
            Filter::And(more) => filters.extend(more),
            eq => filters.push(eq),
        }
        Filter::And(filters)
    }

    pub fn matches(&self, document: &Json) -> bool {
        match self {
            Filter::Eq { path, value } => lookup(document, path) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }

    /// Every field path the filter constrains
    pub fn fields(&self) -> Vec<&DotPath> {
        match self {
            Filter::Eq { path, .. } => vec![path],
            Filter::And(filters) => filters.iter().flat_map(Filter::fields).collect(),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Filter::Eq { path, value } => {
                let mut object = serde_json::Map::new();
                object.insert(path.to_string(), value.clone());
                Json::Object(object)
            }
            Filter::And(filters) => {
                serde_json::json!({ "$and": filters.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Value at `path`, descending through objects and arrays
pub(crate) fn lookup<'a>(document: &'a Json, path: &DotPath) -> Option<&'a Json> {
    path.segments().try_fold(document, |current, segment| match current {
        Json::Object(object) => object.get(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trackdoc_core::{FieldKind, ScalarType};

    #[test]
    fn test_single_field_is_not_wrapped() {
        let filter = Filter::from_pairs([("name", json!("ada"))]).unwrap();
        assert_eq!(filter, Filter::eq("name", "ada"));
        assert_eq!(filter.to_json(), json!({"name": "ada"}));
    }

    #[test]
    fn test_several_fields_are_anded() {
        let filter = Filter::from_pairs([("realm", json!("eu")), ("name", json!("ada"))]).unwrap();
        assert!(matches!(&filter, Filter::And(parts) if parts.len() == 2));
        assert_eq!(
            filter.to_json(),
            json!({"$and": [{"realm": "eu"}, {"name": "ada"}]})
        );
        assert!(filter.matches(&json!({"realm": "eu", "name": "ada", "level": 3})));
        assert!(!filter.matches(&json!({"realm": "us", "name": "ada"})));
    }

    #[test]
    fn test_duplicate_and_empty_filters_fail() {
        let err = Filter::from_pairs([("name", json!(1)), ("name", json!(2))]).unwrap_err();
        assert!(matches!(err, SaveError::DuplicateFilterField(field) if field == "name"));

        let empty: Vec<(&str, Json)> = Vec::new();
        assert!(matches!(Filter::from_pairs(empty), Err(SaveError::EmptyFilter)));
    }

    #[test]
    fn test_identity_requires_values() {
        let schema = Schema::builder("Player")
            .field("name", FieldKind::Scalar(ScalarType::String))
            .key_fields(["name"])
            .build()
            .unwrap();

        let filter = Filter::identity(&schema, &json!({"name": "ada"})).unwrap();
        assert_eq!(filter.fields(), vec![&DotPath::from("name")]);

        for snapshot in [json!({}), json!({"name": null})] {
            assert!(matches!(
                Filter::identity(&schema, &snapshot),
                Err(SaveError::MissingIdentity { .. })
            ));
        }
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));
        assert_eq!(filter.fields().len(), 3);
        assert!(filter.matches(&json!({"a": 1, "b": 2, "c": 3})));
    }

    #[test]
    fn test_lookup_descends_into_arrays() {
        let doc = json!({"items": [{"level": 1}, {"level": 2}]});
        assert_eq!(lookup(&doc, &DotPath::from("items.1.level")), Some(&json!(2)));
        assert_eq!(lookup(&doc, &DotPath::from("items.5")), None);
        assert!(Filter::eq("items.0.level", 1).matches(&doc));
    }
}
