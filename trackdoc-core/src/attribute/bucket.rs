//! Bucketed attribute store

use super::{AnyValue, AttributeMap, AttributeSlot};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

const DEFAULT_BUCKETS: usize = 4;

struct Entry {
    id: usize,
    slot: Option<Arc<AttributeSlot>>,
    next: Option<Box<Entry>>,
}

impl Entry {
    fn sentinel() -> Self {
        Entry {
            id: usize::MAX,
            slot: None,
            next: None,
        }
    }
}

/// Singly linked list anchored at a sentinel head
struct Bucket {
    head: Mutex<Entry>,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            head: Mutex::new(Entry::sentinel()),
        }
    }

    fn find(&self, id: usize) -> Option<Arc<AttributeSlot>> {
        let head = self.head.lock();
        let mut cursor = head.next.as_deref();
        while let Some(entry) = cursor {
            if entry.id == id {
                return entry.slot.clone();
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    fn find_or_insert(&self, id: usize) -> Arc<AttributeSlot> {
        let mut head = self.head.lock();
        let mut cursor = head.next.as_deref();
        while let Some(entry) = cursor {
            if entry.id == id {
                if let Some(slot) = &entry.slot {
                    return slot.clone();
                }
            }
            cursor = entry.next.as_deref();
        }

        let slot = Arc::new(AttributeSlot::new(id));
        let entry = Box::new(Entry {
            id,
            slot: Some(slot.clone()),
            next: head.next.take(),
        });
        head.next = Some(entry);
        slot
    }

    fn unlink(&self, id: usize) -> Option<AnyValue> {
        let mut head = self.head.lock();
        let mut cursor = &mut head.next;
        while matches!(cursor, Some(entry) if entry.id != id) {
            cursor = &mut cursor.as_mut()?.next;
        }

        let slot = cursor.as_ref()?.slot.clone()?;
        let value = slot.take();
        // A slot already flagged was unlinked by an earlier removal.
        if slot.mark_removed() {
            let mut removed = cursor.take()?;
            *cursor = removed.next.take();
        }
        value
    }

    fn len(&self) -> usize {
        let head = self.head.lock();
        let mut count = 0;
        let mut cursor = head.next.as_deref();
        while let Some(entry) = cursor {
            count += 1;
            cursor = entry.next.as_deref();
        }
        count
    }
}

/// Fixed number of lock-protected buckets keyed by constant id
///
/// Supports an unbounded key universe; contention is bounded per bucket.
pub struct BucketAttributeMap {
    buckets: Box<[Bucket]>,
    mask: usize,
}

impl BucketAttributeMap {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// `buckets` is rounded up to the next power of two
    pub fn with_buckets(buckets: usize) -> Self {
        let count = buckets.max(1).next_power_of_two();
        let buckets: Vec<Bucket> = (0..count).map(|_| Bucket::new()).collect();
        Self {
            buckets: buckets.into_boxed_slice(),
            mask: count - 1,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of linked slots across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(&self, id: usize) -> &Bucket {
        &self.buckets[id & self.mask]
    }
}

impl Default for BucketAttributeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeMap for BucketAttributeMap {
    fn slot(&self, id: usize) -> Option<Arc<AttributeSlot>> {
        self.bucket(id).find(id)
    }

    fn slot_or_insert(&self, id: usize) -> Arc<AttributeSlot> {
        self.bucket(id).find_or_insert(id)
    }

    fn remove_slot(&self, id: usize) -> Option<AnyValue> {
        self.bucket(id).unlink(id)
    }
}

impl fmt::Debug for BucketAttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketAttributeMap")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len())
            .finish()
    }
}
