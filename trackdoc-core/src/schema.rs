//! Schema descriptor tables
//!
//! A [`Schema`] is the statically built description of one document or
//! record type: every field's name, its persisted path segment and its kind.
//! Tree wiring and the JSON loader consult it instead of discovering fields
//! at runtime. Identity declarations are checked once, in
//! [`SchemaBuilder::build`], so configuration mistakes never surface during
//! mutation.

use crate::error::SchemaError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Segment of the implicit identifier field
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Scalar value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Any,
    Bool,
    Int,
    Double,
    String,
}

/// What a container field holds
#[derive(Debug, Clone)]
pub enum ElementKind {
    Scalar(ScalarType),
    Record(Arc<Schema>),
}

/// Declared kind of a record field
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarType),
    List(ElementKind),
    Set(ElementKind),
    Map(ElementKind),
    Record(Arc<Schema>),

    /// Integer counter used for optimistic concurrency
    Version,
}

impl FieldKind {
    /// Short name used in error messages
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Scalar(ScalarType::Any) => "any value".to_string(),
            FieldKind::Scalar(ScalarType::Bool) => "bool".to_string(),
            FieldKind::Scalar(ScalarType::Int) => "int".to_string(),
            FieldKind::Scalar(ScalarType::Double) => "double".to_string(),
            FieldKind::Scalar(ScalarType::String) => "string".to_string(),
            FieldKind::List(_) => "list".to_string(),
            FieldKind::Set(_) => "set".to_string(),
            FieldKind::Map(_) => "map".to_string(),
            FieldKind::Record(schema) => format!("record `{}`", schema.name()),
            FieldKind::Version => "version counter".to_string(),
        }
    }

    /// Returns true for list, set and map fields
    pub fn is_container(&self) -> bool {
        matches!(self, FieldKind::List(_) | FieldKind::Set(_) | FieldKind::Map(_))
    }
}

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,

    /// Name under which the field is persisted and addressed in paths
    pub segment: String,

    pub kind: FieldKind,
}

/// How a document type declares its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityDecl {
    /// One or more key fields, combined with AND
    Fields(Vec<String>),

    /// A single record-valued field holding the whole key
    Composite(String),

    /// The implicit `_id` field
    DefaultId,
}

/// Field table of one record type
#[derive(Debug)]
pub struct Schema {
    name: String,
    collection: String,
    fields: Vec<FieldDescriptor>,
    identity: IdentityDecl,
    version: Option<String>,
    parent: Option<String>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage collection for documents of this type
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by declared name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by persisted segment
    pub fn field_by_segment(&self, segment: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.segment == segment)
    }

    pub fn identity(&self) -> &IdentityDecl {
        &self.identity
    }

    /// Persisted segments making up the identity filter
    pub fn identity_fields(&self) -> Vec<String> {
        match &self.identity {
            IdentityDecl::Fields(names) => names
                .iter()
                .filter_map(|name| self.field(name))
                .map(|f| f.segment.clone())
                .collect(),
            IdentityDecl::Composite(name) => self
                .field(name)
                .map(|f| vec![f.segment.clone()])
                .unwrap_or_default(),
            IdentityDecl::DefaultId => vec![DEFAULT_ID_FIELD.to_string()],
        }
    }

    /// Persisted segment of the version counter, if declared
    pub fn version_field(&self) -> Option<&str> {
        let name = self.version.as_deref()?;
        self.field(name).map(|f| f.segment.as_str())
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} fields)", self.name, self.fields.len())
    }
}

/// Builder for [`Schema`]
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    fields: Vec<FieldDescriptor>,
    identity: Vec<IdentityDecl>,
    version: Option<String>,
    parent: Option<Arc<Schema>>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: Vec::new(),
            identity: Vec::new(),
            version: None,
            parent: None,
        }
    }

    pub fn field(self, name: &str, kind: FieldKind) -> Self {
        self.field_as(name, name, kind)
    }

    /// Declare a field persisted under a different segment
    pub fn field_as(mut self, name: &str, segment: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            segment: segment.to_string(),
            kind,
        });
        self
    }

    pub fn key_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity
            .push(IdentityDecl::Fields(names.into_iter().map(Into::into).collect()));
        self
    }

    pub fn composite_key(mut self, name: &str) -> Self {
        self.identity.push(IdentityDecl::Composite(name.to_string()));
        self
    }

    /// Declare the version counter; added as a version field if absent
    pub fn version(mut self, name: &str) -> Self {
        self.version = Some(name.to_string());
        self
    }

    pub fn collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// Inherit fields, identity and version from `parent`
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let name = self.name;

        let mut fields = Vec::new();
        let mut identity = None;
        let mut version = self.version;
        let mut collection = self.collection;
        if let Some(parent) = &self.parent {
            fields.extend(parent.fields.iter().cloned());
            if self.identity.is_empty() || parent.identity == IdentityDecl::DefaultId {
                identity = Some(parent.identity.clone());
            } else {
                return Err(SchemaError::AmbiguousIdentity {
                    schema: name,
                    parent: parent.name.clone(),
                });
            }
            version = version.or_else(|| parent.version.clone());
            collection = collection.or_else(|| Some(parent.collection.clone()));
        }

        let mut seen: HashSet<String> = fields.iter().map(|f| f.name.clone()).collect();
        let mut segments: HashSet<String> = fields.iter().map(|f| f.segment.clone()).collect();
        for field in self.fields {
            if !seen.insert(field.name.clone()) || !segments.insert(field.segment.clone()) {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    field: field.name,
                });
            }
            fields.push(field);
        }

        let mut declared = self.identity.into_iter();
        if let Some(decl) = declared.next() {
            if declared.next().is_some() {
                return Err(SchemaError::ConflictingIdentity(name));
            }
            identity = Some(decl);
        }
        let identity = identity.unwrap_or(IdentityDecl::DefaultId);
        validate_identity(&name, &identity, &fields)?;

        if identity == IdentityDecl::DefaultId && !fields.iter().any(|f| f.segment == DEFAULT_ID_FIELD) {
            fields.insert(
                0,
                FieldDescriptor {
                    name: DEFAULT_ID_FIELD.to_string(),
                    segment: DEFAULT_ID_FIELD.to_string(),
                    kind: FieldKind::Scalar(ScalarType::Any),
                },
            );
        }

        if let Some(version_name) = &version {
            match fields.iter().find(|f| &f.name == version_name) {
                Some(FieldDescriptor {
                    kind: FieldKind::Version,
                    ..
                }) => {}
                Some(_) => {
                    return Err(SchemaError::InvalidVersionField {
                        schema: name,
                        field: version_name.clone(),
                    })
                }
                None => fields.push(FieldDescriptor {
                    name: version_name.clone(),
                    segment: version_name.clone(),
                    kind: FieldKind::Version,
                }),
            }
        }

        if let Some(field) = fields.iter().find(|f| !is_valid_segment(&f.segment)) {
            return Err(SchemaError::InvalidSegment {
                schema: name,
                field: field.name.clone(),
                segment: field.segment.clone(),
            });
        }

        tracing::debug!(schema = %name, fields = fields.len(), "built schema");
        Ok(Arc::new(Schema {
            collection: collection.unwrap_or_else(|| name.to_lowercase()),
            name,
            fields,
            identity,
            version,
            parent: self.parent.map(|p| p.name.clone()),
        }))
    }
}

/// Persisted segments must not read as nested paths or operators
fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('.') && !segment.starts_with('$')
}

fn validate_identity(
    schema: &str,
    identity: &IdentityDecl,
    fields: &[FieldDescriptor],
) -> Result<(), SchemaError> {
    match identity {
        IdentityDecl::Fields(names) => {
            if names.is_empty() {
                return Err(SchemaError::EmptyIdentity(schema.to_string()));
            }
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(SchemaError::DuplicateIdentityField {
                        schema: schema.to_string(),
                        field: name.clone(),
                    });
                }
                if !fields.iter().any(|f| &f.name == name) {
                    return Err(SchemaError::UnknownIdentityField {
                        schema: schema.to_string(),
                        field: name.clone(),
                    });
                }
            }
            Ok(())
        }
        IdentityDecl::Composite(name) => match fields.iter().find(|f| &f.name == name) {
            Some(FieldDescriptor {
                kind: FieldKind::Record(_),
                ..
            }) => Ok(()),
            Some(_) => Err(SchemaError::CompositeKeyNotRecord {
                schema: schema.to_string(),
                field: name.clone(),
            }),
            None => Err(SchemaError::UnknownIdentityField {
                schema: schema.to_string(),
                field: name.clone(),
            }),
        },
        IdentityDecl::DefaultId => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string() -> FieldKind {
        FieldKind::Scalar(ScalarType::String)
    }

    #[test]
    fn test_key_fields_resolve_to_segments() {
        let schema = Schema::builder("Player")
            .field_as("name", "n", string())
            .field("realm", string())
            .key_fields(["name", "realm"])
            .version("version")
            .build()
            .unwrap();

        assert_eq!(schema.identity_fields(), vec!["n", "realm"]);
        assert_eq!(schema.version_field(), Some("version"));
        assert_eq!(schema.collection(), "player");
        assert!(schema.field_by_segment("n").is_some());
    }

    #[test]
    fn test_duplicate_identity_field() {
        let err = Schema::builder("Player")
            .field("name", string())
            .key_fields(["name", "name"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateIdentityField { .. }));
    }

    #[test]
    fn test_empty_and_unknown_identity() {
        let empty = Schema::builder("A").key_fields(Vec::<String>::new()).build();
        assert_eq!(empty.unwrap_err(), SchemaError::EmptyIdentity("A".into()));

        let unknown = Schema::builder("A").key_fields(["missing"]).build();
        assert!(matches!(unknown, Err(SchemaError::UnknownIdentityField { .. })));
    }

    #[test]
    fn test_default_id_is_implicit() {
        let schema = Schema::builder("Note").field("body", string()).build().unwrap();
        assert_eq!(schema.identity(), &IdentityDecl::DefaultId);
        assert_eq!(schema.identity_fields(), vec![DEFAULT_ID_FIELD]);
        assert_eq!(schema.fields()[0].segment, DEFAULT_ID_FIELD);
    }

    #[test]
    fn test_composite_key_must_be_record() {
        let key = Schema::builder("Key")
            .field("a", string())
            .field("b", string())
            .build()
            .unwrap();

        let ok = Schema::builder("Doc")
            .field("key", FieldKind::Record(key))
            .composite_key("key")
            .build()
            .unwrap();
        assert_eq!(ok.identity_fields(), vec!["key"]);

        let err = Schema::builder("Doc")
            .field("key", string())
            .composite_key("key")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::CompositeKeyNotRecord { .. }));
    }

    #[test]
    fn test_ambiguous_identity_across_inheritance() {
        let base = Schema::builder("Base")
            .field("code", string())
            .key_fields(["code"])
            .build()
            .unwrap();

        let err = Schema::builder("Derived")
            .extends(&base)
            .field("alt", string())
            .key_fields(["alt"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousIdentity { .. }));

        let derived = Schema::builder("Derived")
            .extends(&base)
            .field("extra", string())
            .build()
            .unwrap();
        assert_eq!(derived.identity_fields(), vec!["code"]);
        assert_eq!(derived.collection(), "base");
        assert_eq!(derived.parent(), Some("Base"));
    }

    #[test]
    fn test_conflicting_and_duplicate_declarations() {
        let conflicting = Schema::builder("A")
            .field("x", string())
            .key_fields(["x"])
            .key_fields(["x"])
            .build();
        assert!(matches!(conflicting, Err(SchemaError::ConflictingIdentity(_))));

        let duplicate = Schema::builder("A")
            .field("x", string())
            .field_as("y", "x", string())
            .build();
        assert!(matches!(duplicate, Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_persisted_segments_are_plain_names() {
        for segment in ["", "a.b", "$x"] {
            let err = Schema::builder("A")
                .field_as("x", segment, string())
                .build()
                .unwrap_err();
            assert_eq!(
                err,
                SchemaError::InvalidSegment {
                    schema: "A".into(),
                    field: "x".into(),
                    segment: segment.into(),
                }
            );
        }

        let err = Schema::builder("A").version("meta.rev").build().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSegment { .. }));
    }

    #[test]
    fn test_version_field_kind_is_checked() {
        let err = Schema::builder("A")
            .field("version", string())
            .version("version")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVersionField { .. }));
    }
}
