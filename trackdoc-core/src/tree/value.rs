//! Dynamic document values

use super::arena::NodeId;
use super::containers::{TrackedList, TrackedMap, TrackedSet};
use super::node::{attach_node, detach_node, TreeNode};
use super::record::Record;
use super::DocumentTree;
use crate::error::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use trackdoc_types::Segment;

/// A value held by a record field or a container slot
///
/// Containers and records are shared handles: cloning a `Value` clones the
/// handle, not the node. Equality is structural; map entries and set members
/// compare independent of order, doubles compare bitwise.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Arc<TrackedList>),
    Set(Arc<TrackedSet>),
    Map(Arc<TrackedMap>),
    Record(Arc<Record>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Arc<TrackedList>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Arc<TrackedSet>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Arc<TrackedMap>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<Record>> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn as_node(&self) -> Option<&dyn TreeNode> {
        match self {
            Value::List(list) => Some(list.as_ref()),
            Value::Set(set) => Some(set.as_ref()),
            Value::Map(map) => Some(map.as_ref()),
            Value::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }

    /// True if both values are the same container or record instance
    pub fn same_node(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for a container or record linked into a tree
    pub fn is_attached(&self) -> bool {
        self.as_node().is_some_and(|node| node.core().is_attached())
    }

    pub(crate) fn attach(&self, tree: &Arc<DocumentTree>, parent: NodeId, segment: Segment) -> Result<()> {
        match self.as_node() {
            Some(node) => attach_node(node, tree, parent, segment),
            None => Ok(()),
        }
    }

    pub(crate) fn detach(&self) {
        if let Some(node) = self.as_node() {
            detach_node(node);
        }
    }

    pub(crate) fn reposition(&self, segment: Segment) {
        if let Some(node) = self.as_node() {
            node.core().reposition(segment);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(list) => list.to_json(),
            Value::Set(set) => set.to_json(),
            Value::Map(map) => map.to_json(),
            Value::Record(record) => record.to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.same_node(other) {
            return true;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.to_vec() == b.to_vec(),
            (Value::Set(a), Value::Set(b)) => a.same_members(b),
            (Value::Map(a), Value::Map(b)) => entries_match(&a.entries(), |k| b.get(k), b.len()),
            (Value::Record(a), Value::Record(b)) => {
                a.schema().name() == b.schema().name()
                    && entries_match(&a.entries(), |k| b.get_segment(k), b.entries().len())
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

fn entries_match(
    mine: &[(String, Value)],
    theirs: impl Fn(&str) -> Option<Value>,
    their_len: usize,
) -> bool {
    mine.len() == their_len
        && mine
            .iter()
            .all(|(key, value)| theirs(key).as_ref() == Some(value))
}

/// Order-independent digest of keyed entries
pub(crate) fn hash_entries(entries: &[(String, Value)]) -> u64 {
    entries.iter().fold(0u64, |acc, entry| {
        let mut hasher = DefaultHasher::new();
        entry.hash(&mut hasher);
        acc.wrapping_add(hasher.finish())
    })
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(list) => list.to_vec().hash(state),
            Value::Set(set) => set.hash_members(state),
            Value::Map(map) => {
                let entries = map.entries();
                entries.len().hash(state);
                hash_entries(&entries).hash(state);
            }
            Value::Record(record) => {
                record.schema().name().hash(state);
                hash_entries(&record.entries()).hash(state);
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Arc<TrackedList>> for Value {
    fn from(list: Arc<TrackedList>) -> Self {
        Value::List(list)
    }
}

impl From<Arc<TrackedSet>> for Value {
    fn from(set: Arc<TrackedSet>) -> Self {
        Value::Set(set)
    }
}

impl From<Arc<TrackedMap>> for Value {
    fn from(map: Arc<TrackedMap>) -> Self {
        Value::Map(map)
    }
}

impl From<Arc<Record>> for Value {
    fn from(record: Arc<Record>) -> Self {
        Value::Record(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
