//! Tracked containers
//!
//! Each container pairs a listenable container of [`Value`]s with a
//! [`NodeCore`]. A recorder installed as the container's listener keeps
//! child nodes linked to the right slots on every notification, and on
//! outermost notifications records the changed path:
//!
//! | change                          | recorded path   |
//! |---------------------------------|-----------------|
//! | list add, remove, clear, batch  | `list`          |
//! | list element replaced at `i`    | `list.i`        |
//! | any set change                  | `set`           |
//! | map put or remove of `k`        | `map.k`         |
//! | map batch put                   | `map.k` per key |
//! | map clear                       | `map`           |

use super::node::{attach_child, ensure_free, NodeCore, TreeNode};
use super::value::Value;
use crate::error::{Result, TrackError};
use crate::listenable::{
    Change, ChangeContext, ChangeListener, ChangeLock, ListenableMap, ListenableSet, ListenableVec, LockMode,
};
use std::fmt;
use std::hash::Hasher;
use std::sync::{Arc, Weak};
use trackdoc_types::{DotPath, Segment};

/// How keyed children are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyStyle {
    Field,
    Key,
}

impl KeyStyle {
    fn segment(self, key: &str) -> Segment {
        match self {
            KeyStyle::Field => Segment::field(key),
            KeyStyle::Key => Segment::key(key),
        }
    }
}

fn detach_replaced(old: &Option<Value>, new: &Value) {
    if let Some(old) = old {
        if !old.same_node(new) {
            old.detach();
        }
    }
}

/// Listener for sequences
struct SequenceRecorder {
    core: Arc<NodeCore>,
    items: Weak<ListenableVec<Value>>,
}

impl SequenceRecorder {
    /// Point every element from `from` onwards at its current index
    fn reindex(&self, from: usize) {
        if let Some(items) = self.items.upgrade() {
            items.read(|items| {
                for (index, item) in items.iter().enumerate().skip(from) {
                    item.reposition(Segment::Index(index));
                }
            });
        }
    }
}

impl ChangeListener<usize, Value> for SequenceRecorder {
    fn on_change(&self, change: &Change<usize, Value>, cx: &ChangeContext) -> Result<()> {
        match change {
            Change::AfterAdd { key, value, appended } => {
                if !appended {
                    self.reindex(key + 1);
                }
                attach_child(&self.core, value, Segment::Index(*key))?;
            }
            Change::AfterAddAll { entries } => {
                for (index, value) in entries {
                    attach_child(&self.core, value, Segment::Index(*index))?;
                }
            }
            Change::AfterPut { key, old, new } => {
                detach_replaced(old, new);
                attach_child(&self.core, new, Segment::Index(*key))?;
            }
            Change::AfterRemove { key, value } => {
                value.detach();
                self.reindex(*key);
            }
            Change::BeforeClear { entries } => {
                for (_, value) in entries {
                    value.detach();
                }
            }
            Change::AfterPutAll { .. } | Change::AfterRemoveAll { .. } => {}
        }

        if cx.outermost {
            match change {
                Change::AfterPut { key, .. } => self.core.record(Some(&Segment::Index(*key))),
                _ => self.core.record(None),
            }
        }
        Ok(())
    }
}

/// Listener for sets; members have no path of their own
struct MemberRecorder {
    core: Arc<NodeCore>,
}

impl ChangeListener<usize, Value> for MemberRecorder {
    fn on_change(&self, change: &Change<usize, Value>, cx: &ChangeContext) -> Result<()> {
        match change {
            Change::AfterAdd { value, .. } => attach_child(&self.core, value, Segment::Member)?,
            Change::AfterAddAll { entries } => {
                for (_, value) in entries {
                    attach_child(&self.core, value, Segment::Member)?;
                }
            }
            Change::AfterRemove { value, .. } => value.detach(),
            Change::BeforeClear { entries } => {
                for (_, value) in entries {
                    value.detach();
                }
            }
            Change::AfterPut { .. } | Change::AfterPutAll { .. } | Change::AfterRemoveAll { .. } => {}
        }

        if cx.outermost {
            self.core.record(None);
        }
        Ok(())
    }
}

/// Listener for maps and record fields
pub(crate) struct KeyedRecorder {
    pub(crate) core: Arc<NodeCore>,
    pub(crate) style: KeyStyle,
}

impl ChangeListener<String, Value> for KeyedRecorder {
    fn on_change(&self, change: &Change<String, Value>, cx: &ChangeContext) -> Result<()> {
        match change {
            Change::AfterAdd { key, value, .. } => {
                attach_child(&self.core, value, self.style.segment(key))?;
            }
            Change::AfterAddAll { entries } => {
                for (key, value) in entries {
                    attach_child(&self.core, value, self.style.segment(key))?;
                }
            }
            Change::AfterPut { key, old, new } => {
                detach_replaced(old, new);
                attach_child(&self.core, new, self.style.segment(key))?;
            }
            Change::AfterRemove { value, .. } => value.detach(),
            Change::BeforeClear { entries } => {
                for (_, value) in entries {
                    value.detach();
                }
            }
            Change::AfterPutAll { .. } | Change::AfterRemoveAll { .. } => {}
        }

        if cx.outermost {
            match change {
                Change::AfterAdd { key, .. } | Change::AfterPut { key, .. } | Change::AfterRemove { key, .. } => {
                    self.core.record(Some(&self.style.segment(key)));
                }
                Change::AfterPutAll { keys } => {
                    for key in keys {
                        self.core.record(Some(&self.style.segment(key)));
                    }
                }
                Change::AfterAddAll { entries } | Change::AfterRemoveAll { entries } => {
                    for (key, _) in entries {
                        self.core.record(Some(&self.style.segment(key)));
                    }
                }
                Change::BeforeClear { .. } => self.core.record(None),
            }
        }
        Ok(())
    }
}

/// Tracked ordered sequence
pub struct TrackedList {
    core: Arc<NodeCore>,
    items: Arc<ListenableVec<Value>>,
}

impl TrackedList {
    pub(crate) fn new(core: NodeCore, mode: LockMode, items: Vec<Value>) -> Arc<Self> {
        let core = Arc::new(core);
        let items = Arc::new(ListenableVec::from_vec(items, mode));
        items.set_listener(Arc::new(SequenceRecorder {
            core: core.clone(),
            items: Arc::downgrade(&items),
        }));
        Arc::new(Self { core, items })
    }

    pub fn path(&self) -> Option<DotPath> {
        self.core.path()
    }

    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    pub fn change_lock(&self) -> &ChangeLock {
        self.items.change_lock()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.to_vec()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        ensure_free(&value, None)?;
        self.items.push(value)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        ensure_free(&value, None)?;
        self.items.insert(index, value)
    }

    /// Replace the element at `index`, recording `list.index`
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        ensure_free(&value, self.items.get(index).as_ref())?;
        self.items.set(index, value)
    }

    pub fn remove(&self, index: usize) -> Result<Value> {
        self.items.remove(index)
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        self.items.pop()
    }

    pub fn extend<I, V>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        for value in &values {
            ensure_free(value, None)?;
        }
        self.items.extend(values)
    }

    pub fn retain<F>(&self, keep: F) -> Result<usize>
    where
        F: FnMut(&Value) -> bool,
    {
        self.items.retain(keep)
    }

    pub fn clear(&self) -> Result<()> {
        self.items.clear()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.read(|items| items.iter().map(Value::to_json).collect()))
    }
}

impl TreeNode for TrackedList {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn children(&self) -> Vec<(Segment, Value)> {
        self.items.read(|items| {
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.as_node().is_some())
                .map(|(index, item)| (Segment::Index(index), item.clone()))
                .collect()
        })
    }
}

impl fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.items, f)
    }
}

/// Tracked insertion-ordered set
pub struct TrackedSet {
    core: Arc<NodeCore>,
    items: Arc<ListenableSet<Value>>,
}

impl TrackedSet {
    pub(crate) fn new(core: NodeCore, mode: LockMode, items: Vec<Value>) -> Arc<Self> {
        let core = Arc::new(core);
        let items = Arc::new(ListenableSet::from_items(items, mode));
        items.set_listener(Arc::new(MemberRecorder { core: core.clone() }));
        Arc::new(Self { core, items })
    }

    pub fn path(&self) -> Option<DotPath> {
        self.core.path()
    }

    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    pub fn change_lock(&self) -> &ChangeLock {
        self.items.change_lock()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// The stored member equal to `value`
    pub fn get(&self, value: &Value) -> Option<Value> {
        self.items.get(value)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.to_vec()
    }

    /// Add a member; false for duplicates, which change nothing
    pub fn insert(&self, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        ensure_free(&value, None)?;
        self.items.insert(value)
    }

    /// Add every new member, returning the accepted ones
    pub fn extend<I, V>(&self, values: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        for value in &values {
            ensure_free(value, None)?;
        }
        self.items.extend(values)
    }

    pub fn remove(&self, value: &Value) -> Result<bool> {
        self.items.remove(value)
    }

    pub fn remove_all<'a, I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.items.remove_all(values)
    }

    pub fn clear(&self) -> Result<()> {
        self.items.clear()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.read(|items| items.iter().map(Value::to_json).collect()))
    }

    pub(crate) fn same_members(&self, other: &TrackedSet) -> bool {
        *self.items == *other.items
    }

    pub(crate) fn hash_members<H: Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&*self.items, state);
    }
}

impl TreeNode for TrackedSet {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn children(&self) -> Vec<(Segment, Value)> {
        self.items.read(|items| {
            items
                .iter()
                .filter(|item| item.as_node().is_some())
                .map(|item| (Segment::Member, item.clone()))
                .collect()
        })
    }
}

impl fmt::Debug for TrackedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.items, f)
    }
}

/// Keys must render as exactly one path segment
pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('.') || key.starts_with('$') {
        return Err(TrackError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Tracked insertion-ordered map with string keys
pub struct TrackedMap {
    core: Arc<NodeCore>,
    entries: Arc<ListenableMap<String, Value>>,
}

impl TrackedMap {
    pub(crate) fn new(core: NodeCore, mode: LockMode, entries: Vec<(String, Value)>) -> Arc<Self> {
        let core = Arc::new(core);
        let entries = Arc::new(ListenableMap::from_entries(entries, mode));
        entries.set_listener(Arc::new(KeyedRecorder {
            core: core.clone(),
            style: KeyStyle::Key,
        }));
        Arc::new(Self { core, entries })
    }

    pub fn path(&self) -> Option<DotPath> {
        self.core.path()
    }

    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    pub fn change_lock(&self) -> &ChangeLock {
        self.entries.change_lock()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read(|entries| entries.get(key).cloned())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read(|entries| entries.contains_key(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.entries()
    }

    /// Write `value` under `key`, recording `map.key`
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let value = value.into();
        check_key(&key)?;
        ensure_free(&value, self.get(&key).as_ref())?;
        self.entries.put(key, value)
    }

    pub fn put_all<I, K, V>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (key, value) in &entries {
            check_key(key)?;
            ensure_free(value, self.get(key).as_ref())?;
        }
        self.entries.put_all(entries)
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.entries.remove(&key.to_string())
    }

    pub fn clear(&self) -> Result<()> {
        self.entries.clear()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.entries.read(|entries| {
            entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect()
        }))
    }
}

impl TreeNode for TrackedMap {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn children(&self) -> Vec<(Segment, Value)> {
        self.entries.read(|entries| {
            entries
                .iter()
                .filter(|(_, value)| value.as_node().is_some())
                .map(|(key, value)| (Segment::key(key.as_str()), value.clone()))
                .collect()
        })
    }
}

impl fmt::Debug for TrackedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.entries, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentModel;
    use crate::TrackingConfig;

    #[test]
    fn test_detached_containers_work_standalone() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let list = model.list();
        list.push(1).unwrap();
        list.insert(0, 0).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.path().is_none());
        assert!(!list.is_attached());
    }

    #[test]
    fn test_map_rejects_unaddressable_keys() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let map = model.map();
        for key in ["", "a.b", "$set"] {
            assert!(matches!(map.put(key, 1), Err(TrackError::InvalidKey(_))));
        }
        assert!(map.put_all(vec![("ok", 1), ("not.ok", 2)]).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_detached_parent_does_not_link_children() {
        let model = DocumentModel::new(TrackingConfig::default()).unwrap();
        let outer = model.list();
        let inner = model.map();
        outer.push(inner.clone()).unwrap();
        assert!(!inner.is_attached());
        assert_eq!(outer.get(0), Some(Value::Map(inner)));
    }
}
