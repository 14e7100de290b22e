//! Generational node arena
//!
//! Parent links are arena indices, never references, so the tree has no
//! ownership cycles and walking to the root costs O(depth).

use trackdoc_types::{DotPath, Segment};

/// Handle to a node slot; stale once the slot is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    parent: Option<NodeId>,
    segment: Option<Segment>,
    live: bool,
}

/// Resolved location of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: DotPath,

    /// The walk crossed a set member; sub-paths collapse onto `path`
    pub opaque: bool,
}

impl ResolvedPath {
    /// Path of the slot `suffix` below this node
    pub fn join(&self, suffix: Option<&Segment>) -> DotPath {
        match suffix {
            Some(segment) if !self.opaque && segment.is_addressable() => self.path.child(segment),
            _ => self.path.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Arena {
    entries: Vec<Entry>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_root(&mut self) -> NodeId {
        self.allocate(None, None)
    }

    /// Add a child of `parent`; `None` if `parent` is stale
    pub fn insert(&mut self, parent: NodeId, segment: Segment) -> Option<NodeId> {
        if !self.is_live(parent) {
            return None;
        }
        Some(self.allocate(Some(parent), Some(segment)))
    }

    fn allocate(&mut self, parent: Option<NodeId>, segment: Option<Segment>) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.parent = parent;
                entry.segment = segment;
                entry.live = true;
                NodeId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    parent,
                    segment,
                    live: true,
                });
                NodeId { index, generation: 0 }
            }
        }
    }

    /// Free the slot; later lookups through `id` fail
    pub fn release(&mut self, id: NodeId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.live = false;
                entry.parent = None;
                entry.segment = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.index);
                true
            }
            None => false,
        }
    }

    pub fn set_segment(&mut self, id: NodeId, segment: Segment) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.segment = Some(segment);
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id)?.parent
    }

    pub fn segment(&self, id: NodeId) -> Option<&Segment> {
        self.entry(id)?.segment.as_ref()
    }

    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Walk to the root and join the segments
    ///
    /// A set member segment discards everything collected below it. `None`
    /// if any node on the way is stale.
    pub fn resolve(&self, id: NodeId) -> Option<ResolvedPath> {
        let mut segments = Vec::new();
        let mut opaque = false;
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.entry(node)?;
            match &entry.segment {
                Some(Segment::Member) => {
                    segments.clear();
                    opaque = true;
                }
                Some(segment) => segments.push(segment),
                None => {}
            }
            current = entry.parent;
        }
        Some(ResolvedPath {
            path: DotPath::from_segments(segments.into_iter().rev()),
            opaque,
        })
    }

    fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.live && e.generation == id.generation)
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.live && e.generation == id.generation)
    }
}
