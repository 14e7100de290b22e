//! Document tree and dirty-path accumulation
//!
//! Every container and record owns a [`NodeCore`]. Attaching a value to a
//! document links its core to an arena slot of the document's
//! [`DocumentTree`] under the segment (field, index, key or set member) by
//! which its parent holds it. When a container reports an outermost change,
//! its node resolves its path through the arena and records it in the tree's
//! [`DirtyPathSet`].
//!
//! Lock order is always container change lock, then arena, then dirty set.

mod arena;
mod containers;
mod dirty;
mod document;
mod load;
mod node;
mod record;
mod value;

pub use arena::{Arena, NodeId, ResolvedPath};
pub use containers::{TrackedList, TrackedMap, TrackedSet};
pub use dirty::{DirtyPathSet, DirtySnapshot, Revision};
pub use document::Document;
pub use node::{NodeCore, NodeLink};
pub use record::Record;
pub use value::Value;

pub(crate) use node::NodeKeys;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trackdoc_types::{DotPath, Segment};

/// Arena plus dirty-path set of one document
#[derive(Debug, Default)]
pub struct DocumentTree {
    arena: RwLock<Arena>,
    dirty: Mutex<DirtyPathSet>,
    epoch: AtomicU64,
}

impl DocumentTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn insert_root(&self) -> NodeId {
        self.arena.write().insert_root()
    }

    pub(crate) fn insert(&self, parent: NodeId, segment: Segment) -> Option<NodeId> {
        self.arena.write().insert(parent, segment)
    }

    pub(crate) fn release(&self, id: NodeId) -> bool {
        let mut arena = self.arena.write();
        let released = arena.release(id);
        if released {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        released
    }

    pub(crate) fn set_segment(&self, id: NodeId, segment: Segment) -> bool {
        let mut arena = self.arena.write();
        if arena.segment(id) == Some(&segment) {
            return false;
        }
        let moved = arena.set_segment(id, segment);
        if moved {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        moved
    }

    /// True if `id` is the child of `parent` at `segment`
    pub(crate) fn occupies(&self, id: NodeId, parent: NodeId, segment: &Segment) -> bool {
        let arena = self.arena.read();
        arena.parent(id) == Some(parent) && arena.segment(id) == Some(segment)
    }

    pub fn resolve(&self, id: NodeId) -> Option<ResolvedPath> {
        self.arena.read().resolve(id)
    }

    /// Layout version; bumped whenever an existing node moves or goes away
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn live_nodes(&self) -> usize {
        self.arena.read().live_count()
    }

    /// Append `path` to the dirty set
    pub fn record(&self, path: DotPath) -> bool {
        let added = self.dirty.lock().append(path.clone());
        tracing::debug!(path = %path, added, "recorded dirty path");
        added
    }

    pub fn dirty_paths(&self) -> Vec<DotPath> {
        self.dirty.lock().paths()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.lock().is_empty()
    }

    pub fn snapshot(&self) -> DirtySnapshot {
        self.dirty.lock().snapshot()
    }

    /// Clear the dirty set if nothing was recorded after `snapshot`
    pub fn settle(&self, snapshot: &DirtySnapshot) -> bool {
        self.dirty.lock().clear_if_revision(snapshot.revision)
    }

    pub fn clear_dirty(&self) {
        self.dirty.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_tracks_layout_changes() {
        let tree = DocumentTree::new();
        let root = tree.insert_root();
        let child = tree.insert(root, Segment::Index(0)).unwrap();
        assert_eq!(tree.epoch(), 0);

        assert!(!tree.set_segment(child, Segment::Index(0)));
        assert_eq!(tree.epoch(), 0);
        assert!(tree.set_segment(child, Segment::Index(1)));
        assert_eq!(tree.epoch(), 1);

        assert!(tree.release(child));
        assert_eq!(tree.epoch(), 2);
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn test_settle_after_concurrent_record_keeps_paths() {
        let tree = DocumentTree::new();
        tree.record("a".into());
        let snapshot = tree.snapshot();
        tree.record("b".into());

        assert!(!tree.settle(&snapshot));
        assert_eq!(tree.dirty_paths().len(), 2);

        let snapshot = tree.snapshot();
        assert!(tree.settle(&snapshot));
        assert!(!tree.is_dirty());
    }
}
