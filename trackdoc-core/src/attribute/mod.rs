//! Per-node attribute storage
//!
//! Nodes keep auxiliary state (their tree link, a cached path) in small
//! identity-keyed attribute stores instead of a general keyed map. Keys are
//! interned by a [`ConstantPool`]; two stores trade allocation cost against
//! the size of the key universe:
//!
//! - [`ArrayAttributeMap`]: slot table indexed by key id, grows only.
//!   Suited to the handful of keys the engine itself registers.
//! - [`BucketAttributeMap`]: fixed number of lock-protected linked-list
//!   buckets. Suited to an unbounded, dynamically discovered key universe.

mod array;
mod bucket;
mod pool;

pub use array::ArrayAttributeMap;
pub use bucket::BucketAttributeMap;
pub use pool::{AttributeKey, Constant, ConstantPool};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type-erased attribute value
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// One attribute slot shared by both store implementations
#[derive(Debug)]
pub struct AttributeSlot {
    id: usize,
    value: RwLock<Option<AnyValue>>,
    removed: AtomicBool,
}

impl AttributeSlot {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            value: RwLock::new(None),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn load(&self) -> Option<AnyValue> {
        self.value.read().clone()
    }

    pub fn store(&self, value: Option<AnyValue>) -> Option<AnyValue> {
        std::mem::replace(&mut *self.value.write(), value)
    }

    /// Store `value` unless the slot is occupied; returns the occupant
    pub fn store_if_absent(&self, value: AnyValue) -> AnyValue {
        let mut guard = self.value.write();
        match guard.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *guard = Some(value.clone());
                value
            }
        }
    }

    pub fn take(&self) -> Option<AnyValue> {
        self.value.write().take()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Flag the slot as removed; true only for the first caller
    pub(crate) fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }
}

/// Identity-keyed, thread-safe attribute storage
///
/// Implementors provide the three slot primitives; the typed operations are
/// derived from them.
pub trait AttributeMap: Send + Sync {
    /// Existing slot for `id`, if any
    fn slot(&self, id: usize) -> Option<Arc<AttributeSlot>>;

    /// Existing slot for `id`, created on first use
    fn slot_or_insert(&self, id: usize) -> Arc<AttributeSlot>;

    /// Null out the slot for `id`, returning its previous value
    fn remove_slot(&self, id: usize) -> Option<AnyValue>;

    fn get<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        let value = self.slot(key.id())?.load()?;
        downcast(key, value)
    }

    /// Replace the value, returning the previous one
    fn set<T: Any + Send + Sync>(&self, key: &AttributeKey<T>, value: T) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        let previous = self.slot_or_insert(key.id()).store(Some(Arc::new(value)))?;
        downcast(key, previous)
    }

    /// Store `value` unless a value is present; returns what the slot holds
    ///
    /// `None` means the slot holds a value of a different type.
    fn set_if_absent<T: Any + Send + Sync>(&self, key: &AttributeKey<T>, value: T) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        let current = self.slot_or_insert(key.id()).store_if_absent(Arc::new(value));
        downcast(key, current)
    }

    fn remove<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        let previous = self.remove_slot(key.id())?;
        downcast(key, previous)
    }

    fn has<T>(&self, key: &AttributeKey<T>) -> bool
    where
        Self: Sized,
    {
        self.slot(key.id())
            .map(|slot| slot.load().is_some())
            .unwrap_or(false)
    }
}

fn downcast<T: Any + Send + Sync>(key: &AttributeKey<T>, value: AnyValue) -> Option<Arc<T>> {
    match value.downcast::<T>() {
        Ok(typed) => Some(typed),
        Err(_) => {
            tracing::warn!(
                key = key.name(),
                expected = std::any::type_name::<T>(),
                "attribute holds a value of another type"
            );
            None
        }
    }
}

/// Which attribute store new nodes use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStoreKind {
    #[default]
    Array,
    Bucketed,
}

/// Attribute store selected by configuration
#[derive(Debug)]
pub enum NodeAttributes {
    Array(ArrayAttributeMap),
    Bucketed(BucketAttributeMap),
}

impl NodeAttributes {
    pub fn new(kind: AttributeStoreKind, buckets: usize) -> Self {
        match kind {
            AttributeStoreKind::Array => NodeAttributes::Array(ArrayAttributeMap::new()),
            AttributeStoreKind::Bucketed => {
                NodeAttributes::Bucketed(BucketAttributeMap::with_buckets(buckets))
            }
        }
    }
}

impl AttributeMap for NodeAttributes {
    fn slot(&self, id: usize) -> Option<Arc<AttributeSlot>> {
        match self {
            NodeAttributes::Array(map) => map.slot(id),
            NodeAttributes::Bucketed(map) => map.slot(id),
        }
    }

    fn slot_or_insert(&self, id: usize) -> Arc<AttributeSlot> {
        match self {
            NodeAttributes::Array(map) => map.slot_or_insert(id),
            NodeAttributes::Bucketed(map) => map.slot_or_insert(id),
        }
    }

    fn remove_slot(&self, id: usize) -> Option<AnyValue> {
        match self {
            NodeAttributes::Array(map) => map.remove_slot(id),
            NodeAttributes::Bucketed(map) => map.remove_slot(id),
        }
    }
}
