//! Array-backed attribute store

use super::{AnyValue, AttributeMap, AttributeSlot};
use parking_lot::RwLock;
use std::sync::Arc;

/// Slot table indexed by constant id
///
/// The table only grows: growth copies the existing slots into a larger
/// table and nothing is ever moved downward. A slot, once created, is the
/// same `Arc` for the lifetime of the map, so callers may hold on to it.
#[derive(Debug, Default)]
pub struct ArrayAttributeMap {
    slots: RwLock<Vec<Option<Arc<AttributeSlot>>>>,
}

impl ArrayAttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; capacity]),
        }
    }

    /// Current table length (not the number of occupied slots)
    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }
}

impl AttributeMap for ArrayAttributeMap {
    fn slot(&self, id: usize) -> Option<Arc<AttributeSlot>> {
        self.slots.read().get(id).and_then(|slot| slot.clone())
    }

    fn slot_or_insert(&self, id: usize) -> Arc<AttributeSlot> {
        if let Some(slot) = self.slot(id) {
            return slot;
        }

        let mut slots = self.slots.write();
        if id >= slots.len() {
            let grown = (id + 1).max(slots.len() * 2);
            slots.resize(grown, None);
        }
        slots[id]
            .get_or_insert_with(|| Arc::new(AttributeSlot::new(id)))
            .clone()
    }

    fn remove_slot(&self, id: usize) -> Option<AnyValue> {
        self.slot(id).and_then(|slot| slot.take())
    }
}
