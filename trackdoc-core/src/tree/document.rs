//! Document roots

use super::dirty::DirtySnapshot;
use super::load::record_from_json;
use super::node::{attach_root, TreeNode};
use super::record::Record;
use super::value::Value;
use super::DocumentTree;
use crate::error::Result;
use crate::model::DocumentModel;
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;
use trackdoc_types::DotPath;

/// A root record together with the tree that tracks it
///
/// A new document is populated (per the model's `eager_defaults`) before it
/// is wired, so an untouched document has an empty diff.
pub struct Document {
    model: Arc<DocumentModel>,
    root: Arc<Record>,
    tree: Arc<DocumentTree>,
}

impl Document {
    /// Fresh document of the registered schema `schema`
    pub fn new(model: &Arc<DocumentModel>, schema: &str) -> Result<Self> {
        let schema = model.schema(schema)?;
        let root = model.record(&schema);
        Self::from_record(model, root)
    }

    /// Wire an existing record as a document root
    pub fn from_record(model: &Arc<DocumentModel>, root: Arc<Record>) -> Result<Self> {
        let tree = DocumentTree::new();
        attach_root(root.as_ref(), &tree)?;
        tracing::debug!(schema = root.schema().name(), nodes = tree.live_nodes(), "wired document");
        Ok(Self {
            model: model.clone(),
            root,
            tree,
        })
    }

    /// Rebuild a stored document; the result counts as persisted
    pub fn from_json(model: &Arc<DocumentModel>, schema: &str, json: &serde_json::Value) -> Result<Self> {
        let schema = model.schema(schema)?;
        let root = record_from_json(model, &schema, json)?;
        let document = Self::from_record(model, root)?;
        document.mark_persisted();
        Ok(document)
    }

    pub fn model(&self) -> &Arc<DocumentModel> {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.root.schema()
    }

    pub fn root(&self) -> &Arc<Record> {
        &self.root
    }

    pub fn tree(&self) -> &Arc<DocumentTree> {
        &self.tree
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        self.root.get(field)
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        self.root.set(field, value)
    }

    pub fn unset(&self, field: &str) -> Result<Option<Value>> {
        self.root.unset(field)
    }

    pub fn dirty_paths(&self) -> Vec<DotPath> {
        self.tree.dirty_paths()
    }

    pub fn is_dirty(&self) -> bool {
        self.tree.is_dirty()
    }

    pub fn dirty_snapshot(&self) -> DirtySnapshot {
        self.tree.snapshot()
    }

    /// Clear the dirty set unless something was recorded after `snapshot`
    pub fn settle(&self, snapshot: &DirtySnapshot) -> bool {
        self.tree.settle(snapshot)
    }

    pub fn clear_dirty(&self) {
        self.tree.clear_dirty();
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }

    /// True once the document was loaded or saved
    pub fn is_persisted(&self) -> bool {
        self.root.core().is_persisted()
    }

    pub fn mark_persisted(&self) {
        self.root.core().set_persisted(true);
    }

    /// Integer stored under the persisted segment `field`
    pub fn version(&self, field: &str) -> Option<i64> {
        self.root.get_segment(field).and_then(|v| v.as_int())
    }

    /// Overwrite a version counter without recording a dirty path
    pub fn set_version_untracked(&self, field: &str, version: i64) {
        self.root.put_untracked(field, Value::Int(version));
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("schema", &self.schema().name())
            .field("dirty", &self.dirty_paths())
            .finish()
    }
}
