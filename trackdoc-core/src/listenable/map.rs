//! Listenable insertion-ordered map

use super::{apply_transform, Change, ChangeListener, ChangeLock, ListenerSlot, LockMode, Transform};
use crate::error::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Insertion-ordered map that reports changes keyed by map key
pub struct ListenableMap<K, V> {
    entries: RwLock<IndexMap<K, V>>,
    lock: ChangeLock,
    listener: ListenerSlot<K, V>,
    transform: Option<Transform<V>>,
}

impl<K, V> ListenableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_mode(LockMode::default())
    }

    pub fn with_mode(mode: LockMode) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            lock: ChangeLock::new(mode),
            listener: ListenerSlot::new(),
            transform: None,
        }
    }

    /// Wrap existing entries without notifying anyone
    pub fn from_entries<I>(entries: I, mode: LockMode) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::with_mode(mode);
        map.entries.write().extend(entries);
        map
    }

    /// Transform applied to incoming values
    pub fn with_transform(mut self, transform: Transform<V>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn set_listener(&self, listener: Arc<dyn ChangeListener<K, V>>) {
        self.listener.set(listener);
    }

    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    pub fn change_lock(&self) -> &ChangeLock {
        &self.lock
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    /// Entries in insertion order
    pub fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn read<R>(&self, f: impl FnOnce(&IndexMap<K, V>) -> R) -> R {
        f(&self.entries.read())
    }

    /// Write `value` under `key`, returning the previous value
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let guard = self.lock.enter();
        let value = apply_transform(&self.transform, value);
        let old = self.entries.write().insert(key.clone(), value.clone());
        self.listener.notify(
            Change::AfterPut {
                key,
                old: old.clone(),
                new: value,
            },
            &guard,
        )?;
        Ok(old)
    }

    /// Put every entry; nested puts plus one batch notification
    pub fn put_all<I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let guard = self.lock.enter();
        let mut keys = Vec::new();
        for (key, value) in entries {
            self.put(key.clone(), value)?;
            keys.push(key);
        }
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len();
        self.listener.notify(Change::AfterPutAll { keys }, &guard)?;
        Ok(count)
    }

    /// Write without notifying the listener
    pub(crate) fn put_unobserved(&self, key: K, value: V) -> Option<V> {
        let _guard = self.lock.enter();
        self.entries.write().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let guard = self.lock.enter();
        let removed = self.entries.write().shift_remove_entry(key);
        match removed {
            Some((key, value)) => {
                self.listener.notify(
                    Change::AfterRemove {
                        key,
                        value: value.clone(),
                    },
                    &guard,
                )?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let guard = self.lock.enter();
        let entries = self.entries();
        if entries.is_empty() {
            return Ok(());
        }
        self.listener.notify(Change::BeforeClear { entries }, &guard)?;
        self.entries.write().clear();
        Ok(())
    }
}

impl<K, V> Default for ListenableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ListenableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}
