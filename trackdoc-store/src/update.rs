//! Partial update documents
//!
//! An [`UpdateDoc`] carries `$set`, `$unset` and `$inc` operations keyed by
//! dot path. Diff updates are built from a document's dirty paths: each
//! path whose value is present in the snapshot is set, each missing one is
//! unset.

use crate::filter::lookup;
use serde_json::{Map, Value as Json};
use trackdoc_types::DotPath;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDoc {
    set: Vec<(DotPath, Json)>,
    unset: Vec<DotPath>,
    inc: Vec<(DotPath, i64)>,
}

impl UpdateDoc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update covering `paths`, read from `snapshot`; `version` is never set
    pub fn from_diff(paths: &[DotPath], snapshot: &Json, version: Option<&str>) -> Self {
        let mut update = Self::new();
        for path in paths {
            if version == Some(path.as_str()) {
                continue;
            }
            match lookup(snapshot, path) {
                Some(value) => update.set.push((path.clone(), value.clone())),
                None => update.unset.push(path.clone()),
            }
        }
        update
    }

    /// Update rewriting every top-level field of `snapshot` except `version`
    pub fn full(snapshot: &Json, version: Option<&str>) -> Self {
        let mut update = Self::new();
        if let Some(object) = snapshot.as_object() {
            for (field, value) in object {
                if version != Some(field.as_str()) {
                    update.set.push((DotPath::new(field.clone()), value.clone()));
                }
            }
        }
        update
    }

    pub fn set(mut self, path: impl Into<DotPath>, value: impl Into<Json>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    pub fn unset(mut self, path: impl Into<DotPath>) -> Self {
        self.unset.push(path.into());
        self
    }

    pub fn inc(mut self, path: impl Into<DotPath>, by: i64) -> Self {
        self.inc.push((path.into(), by));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    pub fn set_entries(&self) -> &[(DotPath, Json)] {
        &self.set
    }

    pub fn unset_paths(&self) -> &[DotPath] {
        &self.unset
    }

    pub fn inc_entries(&self) -> &[(DotPath, i64)] {
        &self.inc
    }

    /// Apply the operations to a stored document in place
    pub fn apply_to(&self, document: &mut Json) {
        for (path, value) in &self.set {
            if let Some(slot) = slot_mut(document, path) {
                *slot = value.clone();
            }
        }
        for path in &self.unset {
            remove_at(document, path);
        }
        for (path, by) in &self.inc {
            if let Some(slot) = slot_mut(document, path) {
                let current = slot.as_i64().unwrap_or(0);
                *slot = Json::from(current + by);
            }
        }
    }

    /// Render as a `$set` / `$unset` / `$inc` operator document
    pub fn to_json(&self) -> Json {
        let mut operators = Map::new();
        if !self.set.is_empty() {
            let set = self.set.iter().map(|(p, v)| (p.to_string(), v.clone())).collect();
            operators.insert("$set".into(), Json::Object(set));
        }
        if !self.unset.is_empty() {
            let unset = self.unset.iter().map(|p| (p.to_string(), Json::from(""))).collect();
            operators.insert("$unset".into(), Json::Object(unset));
        }
        if !self.inc.is_empty() {
            let inc = self.inc.iter().map(|(p, by)| (p.to_string(), Json::from(*by))).collect();
            operators.insert("$inc".into(), Json::Object(inc));
        }
        Json::Object(operators)
    }
}

/// Mutable slot at `path`, creating intermediate objects
///
/// Array positions past the end are padded with nulls.
fn slot_mut<'a>(document: &'a mut Json, path: &DotPath) -> Option<&'a mut Json> {
    let mut current = document;
    for segment in path.segments() {
        if current.is_null() {
            *current = Json::Object(Map::new());
        }
        current = match current {
            Json::Object(object) => object.entry(segment.to_string()).or_insert(Json::Null),
            Json::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                if index >= items.len() {
                    items.resize(index + 1, Json::Null);
                }
                &mut items[index]
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Remove the field at `path`; array elements become null
fn remove_at(document: &mut Json, path: &DotPath) {
    let Some(last) = path.segments().last() else {
        return;
    };
    let parent = match path.parent() {
        Some(parent) => slot_existing(document, &parent),
        None => Some(document),
    };
    match parent {
        Some(Json::Object(object)) => {
            object.remove(last);
        }
        Some(Json::Array(items)) => {
            if let Ok(index) = last.parse::<usize>() {
                if let Some(item) = items.get_mut(index) {
                    *item = Json::Null;
                }
            }
        }
        _ => {}
    }
}

fn slot_existing<'a>(document: &'a mut Json, path: &DotPath) -> Option<&'a mut Json> {
    path.segments().try_fold(document, |current, segment| match current {
        Json::Object(object) => object.get_mut(segment),
        Json::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get_mut(index),
            Err(_) => None,
        },
        _ => None,
    })
}
