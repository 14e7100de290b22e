//! Interned attribute identities
//!
//! A [`ConstantPool`] hands out one [`Constant`] per distinct name. Ids are
//! dense and increase monotonically from zero, so they double as indices
//! into array-backed attribute stores.

use crate::error::{Result, TrackError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Interned identity; two constants are equal iff they share an id
#[derive(Clone)]
pub struct Constant {
    id: usize,
    name: Arc<str>,
}

impl Constant {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Constant {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Constant {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constant({}#{})", self.name, self.id)
    }
}

/// Typed handle for one attribute slot
pub struct AttributeKey<T> {
    constant: Constant,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub fn id(&self) -> usize {
        self.constant.id
    }

    pub fn name(&self) -> &str {
        self.constant.name()
    }

    pub fn constant(&self) -> &Constant {
        &self.constant
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        Self {
            constant: self.constant.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeKey({}#{})", self.constant.name, self.constant.id)
    }
}

/// Registry of interned names
///
/// One pool is owned by each [`DocumentModel`](crate::model::DocumentModel);
/// there is no process-wide instance.
#[derive(Default)]
pub struct ConstantPool {
    constants: DashMap<String, Constant>,
    next_id: AtomicUsize,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the constant for `name`, creating it if needed
    pub fn value_of(&self, name: &str) -> Constant {
        if let Some(existing) = self.constants.get(name) {
            return existing.clone();
        }

        // The shard stays write-locked while the id is taken, so every id
        // handed out belongs to exactly one inserted name.
        match self.constants.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let constant = self.allocate(name);
                entry.insert(constant.clone());
                constant
            }
        }
    }

    /// Create a constant, failing if `name` is already taken
    pub fn new_instance(&self, name: &str) -> Result<Constant> {
        match self.constants.entry(name.to_string()) {
            Entry::Occupied(_) => Err(TrackError::DuplicateAttributeKey(name.to_string())),
            Entry::Vacant(entry) => {
                let constant = self.allocate(name);
                entry.insert(constant.clone());
                Ok(constant)
            }
        }
    }

    pub fn key<T>(&self, name: &str) -> AttributeKey<T> {
        AttributeKey {
            constant: self.value_of(name),
            _marker: PhantomData,
        }
    }

    pub fn new_key<T>(&self, name: &str) -> Result<AttributeKey<T>> {
        Ok(AttributeKey {
            constant: self.new_instance(name)?,
            _marker: PhantomData,
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    fn allocate(&self, name: &str) -> Constant {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(name, id, "interned attribute constant");
        Constant {
            id,
            name: Arc::from(name),
        }
    }
}

impl fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantPool")
            .field("len", &self.constants.len())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_of_is_idempotent() {
        let pool = ConstantPool::new();
        let a = pool.value_of("parent");
        let b = pool.value_of("parent");
        assert_eq!(a, b);
        assert_eq!(a.id(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_ids_are_dense() {
        let pool = ConstantPool::new();
        let ids: Vec<usize> = ["a", "b", "c", "a", "d"]
            .iter()
            .map(|name| pool.value_of(name).id())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 3]);
    }

    #[test]
    fn test_new_instance_rejects_duplicates() {
        let pool = ConstantPool::new();
        pool.new_instance("link").unwrap();
        let err = pool.new_instance("link").unwrap_err();
        assert!(matches!(err, TrackError::DuplicateAttributeKey(name) if name == "link"));
        assert!(pool.exists("link"));
        assert!(!pool.exists("other"));
    }

    #[test]
    fn test_typed_keys_share_identity() {
        let pool = ConstantPool::new();
        let key: AttributeKey<u32> = pool.key("count");
        let again: AttributeKey<u32> = pool.key("count");
        assert_eq!(key.id(), again.id());
        assert_eq!(key.name(), "count");
    }
}
