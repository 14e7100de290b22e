//! Per-node tree state
//!
//! A node's link into a [`DocumentTree`] and its cached path live in the
//! node's attribute store under keys registered once per model.

use super::arena::{NodeId, ResolvedPath};
use super::value::Value;
use super::DocumentTree;
use crate::attribute::{AttributeKey, AttributeMap, AttributeStoreKind, ConstantPool, NodeAttributes};
use crate::error::{Result, TrackError};
use std::fmt;
use std::sync::Arc;
use trackdoc_types::{DotPath, Segment};

/// Where a node sits: the tree and its arena slot
#[derive(Debug, Clone)]
pub struct NodeLink {
    pub tree: Arc<DocumentTree>,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedPath {
    epoch: u64,
    id: NodeId,
    resolved: ResolvedPath,
}

/// Attribute keys every node uses
#[derive(Debug)]
pub(crate) struct NodeKeys {
    pub(crate) link: AttributeKey<NodeLink>,
    pub(crate) path: AttributeKey<CachedPath>,
    pub(crate) persisted: AttributeKey<bool>,
}

impl NodeKeys {
    pub(crate) fn register(pool: &ConstantPool) -> Result<Self> {
        Ok(Self {
            link: pool.new_key("trackdoc.node.link")?,
            path: pool.new_key("trackdoc.node.path")?,
            persisted: pool.new_key("trackdoc.node.persisted")?,
        })
    }
}

/// Tree-facing half of every container and record
pub struct NodeCore {
    attrs: NodeAttributes,
    keys: Arc<NodeKeys>,
}

impl NodeCore {
    pub(crate) fn new(keys: Arc<NodeKeys>, store: AttributeStoreKind, buckets: usize) -> Self {
        Self {
            attrs: NodeAttributes::new(store, buckets),
            keys,
        }
    }

    pub fn link(&self) -> Option<Arc<NodeLink>> {
        self.attrs.get(&self.keys.link)
    }

    pub fn is_attached(&self) -> bool {
        self.attrs.has(&self.keys.link)
    }

    /// Current dot path, `None` while detached
    pub fn path(&self) -> Option<DotPath> {
        self.resolved().map(|(_, resolved)| resolved.path)
    }

    pub(crate) fn link_root(&self, tree: &Arc<DocumentTree>) -> Result<NodeId> {
        if self.is_attached() {
            return Err(self.already_attached());
        }
        let id = tree.insert_root();
        self.claim(tree, id)?;
        Ok(id)
    }

    /// Link below `parent`; `Some(id)` only when a new slot was taken
    ///
    /// Linking again at the same parent and segment is a no-op. Linking
    /// under a stale parent leaves the node detached.
    pub(crate) fn link_to(
        &self,
        tree: &Arc<DocumentTree>,
        parent: NodeId,
        segment: Segment,
    ) -> Result<Option<NodeId>> {
        if let Some(existing) = self.link() {
            if Arc::ptr_eq(&existing.tree, tree) && tree.occupies(existing.id, parent, &segment) {
                return Ok(None);
            }
            return Err(self.already_attached());
        }
        let Some(id) = tree.insert(parent, segment) else {
            return Ok(None);
        };
        self.claim(tree, id)?;
        Ok(Some(id))
    }

    fn claim(&self, tree: &Arc<DocumentTree>, id: NodeId) -> Result<()> {
        let link = NodeLink {
            tree: tree.clone(),
            id,
        };
        match self.attrs.set_if_absent(&self.keys.link, link) {
            Some(held) if held.id == id && Arc::ptr_eq(&held.tree, tree) => Ok(()),
            _ => {
                tree.release(id);
                Err(self.already_attached())
            }
        }
    }

    /// Drop the link; true if the node was attached
    pub(crate) fn unlink(&self) -> bool {
        match self.attrs.remove(&self.keys.link) {
            Some(link) => {
                link.tree.release(link.id);
                self.attrs.remove(&self.keys.path);
                tracing::debug!(node = ?link.id, "detached node");
                true
            }
            None => false,
        }
    }

    pub(crate) fn reposition(&self, segment: Segment) {
        if let Some(link) = self.link() {
            link.tree.set_segment(link.id, segment);
        }
    }

    pub(crate) fn resolved(&self) -> Option<(Arc<NodeLink>, ResolvedPath)> {
        let link = self.link()?;
        let epoch = link.tree.epoch();
        if let Some(cached) = self.attrs.get(&self.keys.path) {
            if cached.epoch == epoch && cached.id == link.id {
                return Some((link, cached.resolved.clone()));
            }
        }
        let resolved = link.tree.resolve(link.id)?;
        self.attrs.set(
            &self.keys.path,
            CachedPath {
                epoch,
                id: link.id,
                resolved: resolved.clone(),
            },
        );
        Some((link, resolved))
    }

    /// Record this node's path, or the path of its child slot `suffix`
    pub(crate) fn record(&self, suffix: Option<&Segment>) {
        let Some((link, resolved)) = self.resolved() else {
            return;
        };
        let path = resolved.join(suffix);
        if !path.is_empty() {
            link.tree.record(path);
        }
    }

    pub(crate) fn is_persisted(&self) -> bool {
        self.attrs
            .get(&self.keys.persisted)
            .map(|flag| *flag)
            .unwrap_or(false)
    }

    pub(crate) fn set_persisted(&self, persisted: bool) {
        self.attrs.set(&self.keys.persisted, persisted);
    }

    fn already_attached(&self) -> TrackError {
        let at = self
            .path()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .unwrap_or_else(|| "<root>".to_string());
        TrackError::AlreadyAttached(at)
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("link", &self.link().map(|l| l.id))
            .finish()
    }
}

/// A value that occupies a node in the tree
pub(crate) trait TreeNode {
    fn core(&self) -> &NodeCore;

    /// Current children with the segments they sit under
    fn children(&self) -> Vec<(Segment, Value)>;
}

/// Link `node` and, when newly linked, its whole subtree
pub(crate) fn attach_node(
    node: &dyn TreeNode,
    tree: &Arc<DocumentTree>,
    parent: NodeId,
    segment: Segment,
) -> Result<()> {
    if let Some(id) = node.core().link_to(tree, parent, segment)? {
        attach_children(node, tree, id)?;
    }
    Ok(())
}

pub(crate) fn attach_root(node: &dyn TreeNode, tree: &Arc<DocumentTree>) -> Result<NodeId> {
    let id = node.core().link_root(tree)?;
    attach_children(node, tree, id)?;
    Ok(id)
}

fn attach_children(node: &dyn TreeNode, tree: &Arc<DocumentTree>, id: NodeId) -> Result<()> {
    for (segment, child) in node.children() {
        child.attach(tree, id, segment)?;
    }
    Ok(())
}

/// Unlink `node` and its subtree
pub(crate) fn detach_node(node: &dyn TreeNode) {
    if node.core().unlink() {
        for (_, child) in node.children() {
            child.detach();
        }
    }
}

/// Link `value` below the node owning `parent`, if that node is attached
pub(crate) fn attach_child(parent: &NodeCore, value: &Value, segment: Segment) -> Result<()> {
    match parent.link() {
        Some(link) => value.attach(&link.tree, link.id, segment),
        None => Ok(()),
    }
}

/// Reject values already attached somewhere other than `current`
pub(crate) fn ensure_free(value: &Value, current: Option<&Value>) -> Result<()> {
    let Some(node) = value.as_node() else {
        return Ok(());
    };
    if !node.core().is_attached() || current.is_some_and(|c| c.same_node(value)) {
        return Ok(());
    }
    Err(node.core().already_attached())
}
