//! Local mirror of the document.
//!
//! The tree is an arena of [`ModelNode`]s keyed by value id. Containers hold
//! their children's ids; every node keeps its parent's id so events can
//! bubble to the root and paths can be computed without owning pointers.
//! Removed nodes are detached: they leave the arena and their ids are kept
//! in a tombstone set, so a later operation addressed to one of them can be
//! told apart from one addressed to an id that never existed. The set keeps
//! the most recent [`ModelTree::tombstone_limit`] ids.

mod apply;
mod path;

pub use apply::AppliedChange;
pub use path::{format_pointer, parse_pointer, PathStep};

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use rt_ot::{DataValue, ValueData, ValueKind};
use serde_json::Value;

use crate::error::{ModelError, ProtocolError, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Array(Vec<String>),
    Object(IndexMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub id: String,
    pub parent: Option<String>,
    pub data: NodeData,
}

impl ModelNode {
    pub fn kind(&self) -> ValueKind {
        match &self.data {
            NodeData::String(_) => ValueKind::String,
            NodeData::Number(_) => ValueKind::Number,
            NodeData::Boolean(_) => ValueKind::Boolean,
            NodeData::Null => ValueKind::Null,
            NodeData::Array(_) => ValueKind::Array,
            NodeData::Object(_) => ValueKind::Object,
        }
    }
}

pub const DEFAULT_TOMBSTONE_LIMIT: usize = 4096;

/// Undo record of one batch: prior copies of every node it changed, the
/// nodes it added and the nodes it detached.
#[derive(Debug, Clone, Default)]
struct Journal {
    touched: Vec<ModelNode>,
    touched_ids: HashSet<String>,
    attached: HashSet<String>,
    detached: Vec<ModelNode>,
}

#[derive(Debug, Clone)]
pub struct ModelTree {
    root: String,
    nodes: HashMap<String, ModelNode>,
    detached: IndexSet<String>,
    tombstone_limit: usize,
    journal: Option<Journal>,
}

impl ModelTree {
    pub fn new(root: DataValue) -> Result<Self, ValidationError> {
        let mut tree = Self {
            root: root.id.clone(),
            nodes: HashMap::new(),
            detached: IndexSet::new(),
            tombstone_limit: DEFAULT_TOMBSTONE_LIMIT,
            journal: None,
        };
        tree.check_fresh(std::iter::once(&root))?;
        tree.attach(root, None);
        Ok(tree)
    }

    pub fn with_tombstone_limit(mut self, limit: usize) -> Self {
        self.tombstone_limit = limit;
        self.prune_tombstones();
        self
    }

    pub fn tombstone_limit(&self) -> usize {
        self.tombstone_limit
    }

    /// Number of detached ids currently remembered.
    pub fn tombstones(&self) -> usize {
        self.detached.len()
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&ModelNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_detached(&self, id: &str) -> bool {
        self.detached.contains(id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebuild the [`DataValue`] rooted at `id`.
    pub fn value(&self, id: &str) -> Option<DataValue> {
        let node = self.nodes.get(id)?;
        let data = match &node.data {
            NodeData::String(s) => ValueData::String { value: s.clone() },
            NodeData::Number(n) => ValueData::Number { value: *n },
            NodeData::Boolean(b) => ValueData::Boolean { value: *b },
            NodeData::Null => ValueData::Null,
            NodeData::Array(children) => ValueData::Array {
                children: children
                    .iter()
                    .map(|c| self.value(c))
                    .collect::<Option<Vec<_>>>()?,
            },
            NodeData::Object(children) => ValueData::Object {
                children: children
                    .iter()
                    .map(|(k, c)| self.value(c).map(|v| (k.clone(), v)))
                    .collect::<Option<IndexMap<_, _>>>()?,
            },
        };
        Some(DataValue::new(node.id.clone(), data))
    }

    pub fn root_value(&self) -> Option<DataValue> {
        self.value(&self.root)
    }

    /// Plain JSON view of the node `id` and everything below it.
    pub fn json(&self, id: &str) -> Option<Value> {
        self.value(id).map(|v| v.to_json())
    }

    pub fn to_json(&self) -> Value {
        self.json(&self.root).unwrap_or(Value::Null)
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.nodes.get(id)?.parent.as_deref()
    }

    /// `id` followed by each ancestor up to the root.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = self.nodes.get(id);
        while let Some(node) = cur {
            out.push(node.id.clone());
            cur = node.parent.as_deref().and_then(|p| self.nodes.get(p));
        }
        out
    }

    pub fn path_of(&self, id: &str) -> Option<Vec<PathStep>> {
        let mut steps = Vec::new();
        let mut node = self.nodes.get(id)?;
        while let Some(parent_id) = node.parent.as_deref() {
            let parent = self.nodes.get(parent_id)?;
            let step = match &parent.data {
                NodeData::Array(children) => PathStep::Index(children.iter().position(|c| c == &node.id)?),
                NodeData::Object(children) => {
                    PathStep::Key(children.iter().find(|(_, c)| **c == node.id)?.0.clone())
                }
                _ => return None,
            };
            steps.push(step);
            node = parent;
        }
        steps.reverse();
        Some(steps)
    }

    /// Id of the node at `path` from the root.
    pub fn resolve(&self, path: &[PathStep]) -> Option<&str> {
        let mut cur = self.nodes.get(&self.root)?;
        for step in path {
            let next = match (step, &cur.data) {
                (PathStep::Key(key), NodeData::Object(children)) => children.get(key)?,
                (PathStep::Index(index), NodeData::Array(children)) => children.get(*index)?,
                _ => return None,
            };
            cur = self.nodes.get(next)?;
        }
        Some(cur.id.as_str())
    }

    /// Detach every node, root included. Returns the detached ids.
    pub fn detach_all(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        let root = self.root.clone();
        self.detach(&root, &mut out);
        out
    }

    /// Look up a live node of the given kind.
    ///
    /// A detached target is a protocol error; an id that was never seen is a
    /// validation error.
    pub(crate) fn expect_kind(&self, id: &str, expected: ValueKind) -> Result<&ModelNode, ModelError> {
        let node = self.live(id)?;
        let actual = node.kind();
        if actual != expected {
            return Err(ValidationError::WrongKind {
                id: id.to_string(),
                expected,
                actual,
            }
            .into());
        }
        Ok(node)
    }

    pub(crate) fn live(&self, id: &str) -> Result<&ModelNode, ModelError> {
        if self.detached.contains(id) {
            return Err(ProtocolError::DetachedNode(id.to_string()).into());
        }
        self.nodes
            .get(id)
            .ok_or_else(|| ValidationError::UnknownNode(id.to_string()).into())
    }

    /// Reject values whose ids collide with each other or with any id this
    /// tree has ever held, and values carrying NaN.
    fn check_fresh<'a>(&self, values: impl IntoIterator<Item = &'a DataValue>) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for value in values {
            if let Some(id) = value.find_nan() {
                return Err(ValidationError::NaN { id: id.to_string() });
            }
            let mut dup = None;
            value.walk(&mut |v: &DataValue| {
                if dup.is_none()
                    && (!seen.insert(v.id.clone()) || self.nodes.contains_key(&v.id) || self.detached.contains(&v.id))
                {
                    dup = Some(v.id.clone());
                }
            });
            if let Some(id) = dup {
                return Err(ValidationError::DuplicateId(id));
            }
        }
        Ok(())
    }

    fn attach(&mut self, value: DataValue, parent: Option<&str>) {
        let DataValue { id, data } = value;
        if let Some(journal) = self.journal.as_mut() {
            journal.attached.insert(id.clone());
        }
        let data = match data {
            ValueData::String { value } => NodeData::String(value),
            ValueData::Number { value } => NodeData::Number(value),
            ValueData::Boolean { value } => NodeData::Boolean(value),
            ValueData::Null => NodeData::Null,
            ValueData::Array { children } => {
                let ids = children.iter().map(|c| c.id.clone()).collect();
                for child in children {
                    self.attach(child, Some(id.as_str()));
                }
                NodeData::Array(ids)
            }
            ValueData::Object { children } => {
                let ids = children.iter().map(|(k, c)| (k.clone(), c.id.clone())).collect();
                for (_, child) in children {
                    self.attach(child, Some(id.as_str()));
                }
                NodeData::Object(ids)
            }
        };
        self.nodes.insert(
            id.clone(),
            ModelNode {
                id,
                parent: parent.map(str::to_string),
                data,
            },
        );
    }

    fn detach(&mut self, id: &str, out: &mut Vec<String>) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(journal) = self.journal.as_mut() {
            journal.detached.push(node.clone());
        }
        self.detached.insert(node.id.clone());
        out.push(node.id);
        match node.data {
            NodeData::Array(children) => {
                for child in children {
                    self.detach(&child, out);
                }
            }
            NodeData::Object(children) => {
                for (_, child) in children {
                    self.detach(&child, out);
                }
            }
            _ => {}
        }
    }

    // ── Batches ───────────────────────────────────────────────────────────

    /// Remember the current copy of `id` before the running batch changes it.
    fn touch(&mut self, id: &str) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if journal.attached.contains(id) || !journal.touched_ids.insert(id.to_string()) {
            return;
        }
        if let Some(node) = self.nodes.get(id) {
            journal.touched.push(node.clone());
        }
    }

    fn begin_batch(&mut self) {
        self.journal = Some(Journal::default());
    }

    fn commit_batch(&mut self) {
        self.journal = None;
        self.prune_tombstones();
    }

    /// Put back every node the running batch added, detached or changed.
    fn roll_back_batch(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for id in &journal.attached {
            self.nodes.remove(id);
            self.detached.shift_remove(id);
        }
        for node in journal.detached {
            if journal.attached.contains(&node.id) {
                continue;
            }
            self.detached.shift_remove(&node.id);
            self.nodes.insert(node.id.clone(), node);
        }
        for node in journal.touched {
            self.nodes.insert(node.id.clone(), node);
        }
    }

    fn prune_tombstones(&mut self) {
        let excess = self.detached.len().saturating_sub(self.tombstone_limit);
        if excess > 0 {
            self.detached.drain(..excess).for_each(drop);
        }
    }
}
